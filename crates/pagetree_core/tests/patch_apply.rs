use pagetree_core::db::open_db_in_memory;
use pagetree_core::{
    BlockType, DeleteOp, DocumentId, DocumentService, EngineConfig, ErrorCode, InsertOp,
    NewDocument, PatchEngine, PatchEnvelope, PatchRequest, UpdateOp,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn setup() -> (Connection, PatchEngine, DocumentId) {
    let conn = open_db_in_memory().unwrap();
    let document = create_document(&conn);
    (conn, PatchEngine::default(), document)
}

fn create_document(conn: &Connection) -> DocumentId {
    DocumentService::try_new(conn, EngineConfig::default())
        .unwrap()
        .create_document(&NewDocument::new("page", "Notes"))
        .unwrap()
        .id
}

fn paragraph(text: &str) -> Value {
    json!({ "inline": [{ "type": "text", "text": text }] })
}

fn doc_version(conn: &Connection, document_id: DocumentId) -> i64 {
    conn.query_row(
        "SELECT doc_version FROM documents WHERE id = ?1;",
        [document_id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

/// Every row of every engine table, as JSON.
fn snapshot(conn: &Connection) -> Value {
    let mut tables = serde_json::Map::new();
    for table in [
        "documents",
        "blocks",
        "block_search",
        "block_references",
        "idempotency_records",
    ] {
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {table} ORDER BY 1;"))
            .unwrap();
        let width = stmt.column_count();
        let mut rows = stmt.query([]).unwrap();
        let mut out = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            let mut cells = Vec::new();
            for index in 0..width {
                let cell = match row.get::<_, SqlValue>(index).unwrap() {
                    SqlValue::Null => Value::Null,
                    SqlValue::Integer(value) => json!(value),
                    SqlValue::Real(value) => json!(value),
                    SqlValue::Text(value) => json!(value),
                    SqlValue::Blob(value) => json!(value),
                };
                cells.push(cell);
            }
            out.push(Value::Array(cells));
        }
        tables.insert(table.to_string(), Value::Array(out));
    }
    Value::Object(tables)
}

#[test]
fn successful_patch_bumps_version_by_exactly_one() {
    let (mut conn, engine, document_id) = setup();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let request = PatchRequest::new(document_id)
        .with_base_version(0)
        .with_op(InsertOp::new(a, None, BlockType::Paragraph, paragraph("one")))
        .with_op(InsertOp::new(b, None, BlockType::Paragraph, paragraph("two")))
        .with_op(InsertOp::new(c, None, BlockType::Paragraph, paragraph("three")));
    let result = engine.apply_patch(&mut conn, &request).unwrap();

    assert_eq!(result.api_version, "v1");
    assert_eq!(result.document_id, document_id);
    assert_eq!(result.previous_version, 0);
    assert_eq!(result.new_version, 1);
    assert_eq!(result.applied.inserted_ids, vec![a, b, c]);
    assert!(result.applied.updated_ids.is_empty());
    assert_eq!(doc_version(&conn, document_id), 1);
}

#[test]
fn empty_patch_still_bumps_version() {
    let (mut conn, engine, document_id) = setup();

    let first = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id))
        .unwrap();
    let second = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id).with_base_version(1))
        .unwrap();

    assert_eq!((first.previous_version, first.new_version), (0, 1));
    assert_eq!((second.previous_version, second.new_version), (1, 2));
    assert_eq!(doc_version(&conn, document_id), 2);
}

#[test]
fn stale_base_version_is_a_conflict() {
    let (mut conn, engine, document_id) = setup();
    engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id))
        .unwrap();

    let err = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id).with_base_version(0))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);
    assert_eq!(doc_version(&conn, document_id), 1);
}

#[test]
fn failing_op_rolls_back_every_earlier_op() {
    let (mut conn, engine, document_id) = setup();
    let keep = Uuid::new_v4();
    engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id).with_op(InsertOp::new(
                keep,
                None,
                BlockType::Paragraph,
                paragraph("kept"),
            )),
        )
        .unwrap();
    let before = snapshot(&conn);

    let fresh = Uuid::new_v4();
    let request = PatchRequest::new(document_id)
        .with_op(InsertOp::new(
            fresh,
            None,
            BlockType::Paragraph,
            paragraph("links to [[x]]"),
        ))
        .with_op(UpdateOp::content(keep, paragraph("changed")))
        .with_op(DeleteOp::new(Uuid::new_v4(), false));
    let err = engine.apply_patch(&mut conn, &request).unwrap_err();

    assert_eq!(err.code(), ErrorCode::NotFoundBlock);
    assert_eq!(err.path(), Some("ops[2].blockId"));
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn failing_index_relevant_patch_leaves_no_derived_rows() {
    let (mut conn, engine, document_id) = setup();
    let before = snapshot(&conn);

    let target_document = Uuid::new_v4();
    let request = PatchRequest::new(document_id)
        .with_op(InsertOp::new(
            Uuid::new_v4(),
            None,
            BlockType::Paragraph,
            json!({ "inline": [
                { "type": "text", "text": "searchable words" },
                { "type": "reference", "documentId": target_document.to_string() }
            ]}),
        ))
        .with_op(InsertOp::new(
            Uuid::new_v4(),
            None,
            BlockType::Heading,
            json!({ "level": 9, "inline": [] }),
        ));
    let err = engine.apply_patch(&mut conn, &request).unwrap_err();

    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.path(), Some("ops[1].content.level"));
    assert_eq!(snapshot(&conn), before);
    assert_eq!(count(&conn, "block_search"), 0);
    assert_eq!(count(&conn, "block_references"), 0);
}

#[test]
fn replay_returns_stored_result_without_reapplying() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();
    let request = PatchRequest::new(document_id)
        .with_base_version(0)
        .with_idempotency_key("client-retry-1")
        .with_op(InsertOp::new(block, None, BlockType::Paragraph, paragraph("once")));

    let first = engine.apply_patch(&mut conn, &request).unwrap();
    let snapshot_after_first = snapshot(&conn);
    let replayed = engine.apply_patch(&mut conn, &request).unwrap();

    assert_eq!(replayed, first);
    assert_eq!(snapshot(&conn), snapshot_after_first);
    assert_eq!(count(&conn, "blocks"), 1);
    assert_eq!(doc_version(&conn, document_id), 1);
}

#[test]
fn idempotency_keys_are_scoped_per_document() {
    let (mut conn, engine, first_document) = setup();
    let second_document = create_document(&conn);

    for document_id in [first_document, second_document] {
        let result = engine
            .apply_patch(
                &mut conn,
                &PatchRequest::new(document_id)
                    .with_idempotency_key("same-key")
                    .with_op(InsertOp::new(
                        Uuid::new_v4(),
                        None,
                        BlockType::Paragraph,
                        paragraph("x"),
                    )),
            )
            .unwrap();
        assert_eq!(result.new_version, 1);
    }
    assert_eq!(count(&conn, "idempotency_records"), 2);
}

#[test]
fn expired_idempotency_records_no_longer_replay() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();
    let request = PatchRequest::new(document_id)
        .with_idempotency_key("old")
        .with_op(InsertOp::new(block, None, BlockType::Paragraph, paragraph("x")));
    engine.apply_patch(&mut conn, &request).unwrap();

    conn.execute("UPDATE idempotency_records SET created_at = 0;", [])
        .unwrap();

    let err = engine.apply_patch(&mut conn, &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.path(), Some("ops[0].blockId"));

    assert_eq!(engine.purge_expired_idempotency_records(&conn).unwrap(), 1);
    assert_eq!(count(&conn, "idempotency_records"), 0);
}

#[test]
fn request_level_validation() {
    let (mut conn, engine, document_id) = setup();

    let mut wrong_version = PatchRequest::new(document_id);
    wrong_version.api_version = "v2".to_string();
    let err = engine.apply_patch(&mut conn, &wrong_version).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.path(), Some("apiVersion"));

    let mut bad_id = PatchRequest::new(document_id);
    bad_id.document_id = "not-a-uuid".to_string();
    let err = engine.apply_patch(&mut conn, &bad_id).unwrap_err();
    assert_eq!(err.path(), Some("documentId"));

    let long_key = "k".repeat(256);
    let err = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id).with_idempotency_key(long_key))
        .unwrap_err();
    assert_eq!(err.path(), Some("idempotencyKey"));

    assert_eq!(doc_version(&conn, document_id), 0);
}

#[test]
fn op_count_is_bounded_by_config() {
    let mut conn = open_db_in_memory().unwrap();
    let document_id = create_document(&conn);
    let engine = PatchEngine::new(EngineConfig {
        max_ops_per_patch: 2,
        ..EngineConfig::default()
    });

    let mut request = PatchRequest::new(document_id);
    for _ in 0..3 {
        request = request.with_op(DeleteOp::new(Uuid::new_v4(), false));
    }
    let err = engine.apply_patch(&mut conn, &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.path(), Some("ops"));
}

#[test]
fn missing_and_deleted_documents_are_not_found() {
    let (mut conn, engine, document_id) = setup();

    let err = engine
        .apply_patch(&mut conn, &PatchRequest::new(Uuid::new_v4()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFoundDocument);

    DocumentService::try_new(&conn, EngineConfig::default())
        .unwrap()
        .soft_delete_document(document_id)
        .unwrap();
    let err = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFoundDocument);
}

#[test]
fn update_rules() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();
    engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id).with_op(
                InsertOp::new(block, None, BlockType::Paragraph, paragraph("body"))
                    .with_meta(json!({ "color": "red" })),
            ),
        )
        .unwrap();

    let mut change_type = UpdateOp::content(block, json!({ "level": 1, "inline": [] }));
    change_type.patch.block_type = Some("heading".to_string());
    let err = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id).with_op(change_type))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.path(), Some("ops[0].patch.blockType"));

    let err = engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id)
                .with_op(UpdateOp::content(block, json!({ "inline": "text" }))),
        )
        .unwrap_err();
    assert_eq!(err.path(), Some("ops[0].patch.content.inline"));

    let mut same_type = UpdateOp::content(block, paragraph("edited"));
    same_type.patch.block_type = Some("paragraph".to_string());
    let result = engine
        .apply_patch(&mut conn, &PatchRequest::new(document_id).with_op(same_type))
        .unwrap();
    assert_eq!(result.applied.updated_ids, vec![block]);

    let (content, meta): (String, String) = conn
        .query_row(
            "SELECT content, meta FROM blocks WHERE id = ?1;",
            [block.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), paragraph("edited"));
    assert_eq!(serde_json::from_str::<Value>(&meta).unwrap(), json!({ "color": "red" }));
}

#[test]
fn update_of_deleted_block_is_not_found() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();
    engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id)
                .with_op(InsertOp::new(block, None, BlockType::Paragraph, paragraph("x")))
                .with_op(DeleteOp::new(block, false)),
        )
        .unwrap();

    let err = engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id).with_op(UpdateOp::meta(block, json!({}))),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFoundBlock);
}

#[test]
fn duplicate_block_id_and_bad_explicit_key_are_validation_errors() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();
    engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id).with_op(
                InsertOp::new(block, None, BlockType::Paragraph, paragraph("x"))
                    .with_order_key("M"),
            ),
        )
        .unwrap();

    let err = engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id)
                .with_op(InsertOp::new(block, None, BlockType::Paragraph, paragraph("y"))),
        )
        .unwrap_err();
    assert_eq!(err.path(), Some("ops[0].blockId"));

    for bad_key in ["M", "M0", "a-b"] {
        let err = engine
            .apply_patch(
                &mut conn,
                &PatchRequest::new(document_id).with_op(
                    InsertOp::new(Uuid::new_v4(), None, BlockType::Paragraph, paragraph("z"))
                        .with_order_key(bad_key),
                ),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation, "key {bad_key}");
        assert_eq!(err.path(), Some("ops[0].orderKey"));
    }
}

#[test]
fn json_boundary_returns_tagged_envelopes() {
    let (mut conn, engine, document_id) = setup();
    let block = Uuid::new_v4();

    let request = json!({
        "apiVersion": "v1",
        "documentId": document_id.to_string(),
        "baseVersion": 0,
        "ops": [{
            "op": "insert",
            "blockId": block.to_string(),
            "parentBlockId": null,
            "place": { "where": "start" },
            "blockType": "heading",
            "content": { "level": 2, "inline": [{ "type": "text", "text": "Intro" }] }
        }]
    });
    let response: Value =
        serde_json::from_str(&engine.apply_patch_json(&mut conn, &request.to_string())).unwrap();
    assert_eq!(response["ok"], json!(true));
    assert_eq!(response["result"]["newVersion"], json!(1));
    assert_eq!(
        response["result"]["applied"]["insertedIds"],
        json!([block.to_string()])
    );

    let conflict = engine.apply_patch_json(&mut conn, &request.to_string());
    let envelope: PatchEnvelope = serde_json::from_str(&conflict).unwrap();
    assert!(!envelope.ok);
    let error = envelope.error.unwrap();
    assert_eq!(error.code, ErrorCode::VersionConflict);

    let malformed: Value =
        serde_json::from_str(&engine.apply_patch_json(&mut conn, "{\"ops\": [")).unwrap();
    assert_eq!(malformed["ok"], json!(false));
    assert_eq!(malformed["error"]["code"], json!("VALIDATION"));

    let unknown_op = json!({
        "apiVersion": "v1",
        "documentId": document_id.to_string(),
        "ops": [{ "op": "merge", "blockId": block.to_string() }]
    });
    let response: Value =
        serde_json::from_str(&engine.apply_patch_json(&mut conn, &unknown_op.to_string()))
            .unwrap();
    assert_eq!(response["error"]["code"], json!("VALIDATION"));
    assert_eq!(doc_version(&conn, document_id), 1);
}
