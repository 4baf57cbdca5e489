//! Reference edge extraction.

use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Target of one reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceTarget {
    pub document_id: Uuid,
    pub block_id: Option<Uuid>,
}

/// Collects every `{"type":"reference"}` node anywhere in `content`,
/// including nodes nested in link children and table cells.
///
/// Duplicates collapse to one target; order is first occurrence. Nodes with
/// unparsable ids are skipped.
pub fn extract_references(content: &Value) -> Vec<ReferenceTarget> {
    let mut seen = BTreeSet::new();
    let mut targets = Vec::new();
    collect(content, &mut seen, &mut targets);
    targets
}

fn collect(value: &Value, seen: &mut BTreeSet<ReferenceTarget>, out: &mut Vec<ReferenceTarget>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, seen, out);
            }
        }
        Value::Object(object) => {
            if object.get("type").and_then(Value::as_str) == Some("reference") {
                if let Some(target) = parse_target(value) {
                    if seen.insert(target) {
                        out.push(target);
                    }
                }
            }
            for child in object.values() {
                collect(child, seen, out);
            }
        }
        _ => {}
    }
}

fn parse_target(node: &Value) -> Option<ReferenceTarget> {
    let document_id = Uuid::parse_str(node.get("documentId")?.as_str()?).ok()?;
    let block_id = match node.get("blockId") {
        None | Some(Value::Null) => None,
        Some(value) => Some(Uuid::parse_str(value.as_str()?).ok()?),
    };
    Some(ReferenceTarget {
        document_id,
        block_id,
    })
}
