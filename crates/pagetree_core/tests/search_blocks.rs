use pagetree_core::{
    open_db_in_memory, BlockId, BlockSearchQuery, BlockType, DeleteOp, DocumentId,
    DocumentService, EngineConfig, InsertOp, NewDocument, PatchEngine, PatchRequest, SearchError,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn setup() -> (Connection, PatchEngine, DocumentId) {
    let conn = open_db_in_memory().unwrap();
    let document_id = create_document(&conn);
    (conn, PatchEngine::default(), document_id)
}

fn create_document(conn: &Connection) -> DocumentId {
    DocumentService::try_new(conn, EngineConfig::default())
        .unwrap()
        .create_document(&NewDocument::new("page", "Search"))
        .unwrap()
        .id
}

fn paragraph(text: &str) -> Value {
    json!({ "inline": [{ "type": "text", "text": text }] })
}

fn insert_paragraph(
    conn: &mut Connection,
    engine: &PatchEngine,
    document_id: DocumentId,
    parent: Option<BlockId>,
    text: &str,
) -> BlockId {
    let block = Uuid::new_v4();
    engine
        .apply_patch(
            conn,
            &PatchRequest::new(document_id).with_op(InsertOp::new(
                block,
                parent,
                BlockType::Paragraph,
                paragraph(text),
            )),
        )
        .unwrap();
    block
}

fn search(conn: &Connection, query: &BlockSearchQuery) -> Vec<BlockId> {
    DocumentService::try_new(conn, EngineConfig::default())
        .unwrap()
        .search(query)
        .unwrap()
        .into_iter()
        .map(|hit| hit.block_id)
        .collect()
}

#[test]
fn matching_blocks_are_returned_with_snippets() {
    let (mut conn, engine, document_id) = setup();
    let hit = insert_paragraph(&mut conn, &engine, document_id, None, "rust ownership rules");
    insert_paragraph(&mut conn, &engine, document_id, None, "borrow checker");

    let hits = DocumentService::try_new(&conn, EngineConfig::default())
        .unwrap()
        .search(&BlockSearchQuery::new("ownership"))
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].block_id, hit);
    assert_eq!(hits[0].document_id, document_id);
    assert!(hits[0].snippet.contains("[ownership]"));
}

#[test]
fn every_term_must_match() {
    let (mut conn, engine, document_id) = setup();
    let both = insert_paragraph(&mut conn, &engine, document_id, None, "alpha beta");
    insert_paragraph(&mut conn, &engine, document_id, None, "alpha only");

    assert_eq!(search(&conn, &BlockSearchQuery::new("beta alpha")), vec![both]);
    assert!(search(&conn, &BlockSearchQuery::new("   ")).is_empty());
}

#[test]
fn document_scope_narrows_hits() {
    let (mut conn, engine, first) = setup();
    let second = create_document(&conn);
    let in_first = insert_paragraph(&mut conn, &engine, first, None, "shared term");
    let in_second = insert_paragraph(&mut conn, &engine, second, None, "shared term");

    let mut all = search(&conn, &BlockSearchQuery::new("shared"));
    all.sort();
    let mut expected = vec![in_first, in_second];
    expected.sort();
    assert_eq!(all, expected);

    assert_eq!(
        search(&conn, &BlockSearchQuery::new("shared").in_document(second)),
        vec![in_second]
    );
}

#[test]
fn deleted_and_hidden_blocks_are_excluded() {
    let (mut conn, engine, document_id) = setup();
    let parent = insert_paragraph(&mut conn, &engine, document_id, None, "needle parent");
    let child = insert_paragraph(&mut conn, &engine, document_id, Some(parent), "needle child");
    let other = insert_paragraph(&mut conn, &engine, document_id, None, "needle other");

    engine
        .apply_patch(
            &mut conn,
            &PatchRequest::new(document_id).with_op(DeleteOp::new(parent, false)),
        )
        .unwrap();

    let hits = search(&conn, &BlockSearchQuery::new("needle"));
    assert_eq!(hits, vec![other]);

    let indexed: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM block_search WHERE block_id = ?1;",
            [child.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexed, 1);
}

#[test]
fn deleted_document_is_excluded() {
    let (mut conn, engine, document_id) = setup();
    insert_paragraph(&mut conn, &engine, document_id, None, "gone soon");

    DocumentService::try_new(&conn, EngineConfig::default())
        .unwrap()
        .soft_delete_document(document_id)
        .unwrap();
    assert!(search(&conn, &BlockSearchQuery::new("gone")).is_empty());
}

#[test]
fn user_input_with_fts_operators_is_treated_as_text() {
    let (mut conn, engine, document_id) = setup();
    let block = insert_paragraph(&mut conn, &engine, document_id, None, "say \"hello\" world");

    assert_eq!(search(&conn, &BlockSearchQuery::new("\"hello")), vec![block]);
    assert!(search(&conn, &BlockSearchQuery::new("NOT AND")).is_empty());
}

#[test]
fn raw_syntax_errors_are_reported_as_invalid_query() {
    let (mut conn, engine, document_id) = setup();
    insert_paragraph(&mut conn, &engine, document_id, None, "anything");

    let mut query = BlockSearchQuery::new("\"unterminated");
    query.raw_fts_syntax = true;
    let err = DocumentService::try_new(&conn, EngineConfig::default())
        .unwrap()
        .search(&query)
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery { .. }), "{err}");

    let mut prefix = BlockSearchQuery::new("any*");
    prefix.raw_fts_syntax = true;
    assert_eq!(search(&conn, &prefix).len(), 1);
}

#[test]
fn limit_is_clamped_to_config() {
    let (mut conn, engine, document_id) = setup();
    for index in 0..6 {
        insert_paragraph(&mut conn, &engine, document_id, None, &format!("common {index}"));
    }

    let config = EngineConfig {
        search_default_limit: 2,
        search_max_limit: 4,
        ..EngineConfig::default()
    };
    let service = DocumentService::try_new(&conn, config).unwrap();

    assert_eq!(service.search(&BlockSearchQuery::new("common")).unwrap().len(), 2);

    let mut wide = BlockSearchQuery::new("common");
    wide.limit = Some(50);
    assert_eq!(service.search(&wide).unwrap().len(), 4);

    wide.limit = Some(3);
    assert_eq!(service.search(&wide).unwrap().len(), 3);
}
