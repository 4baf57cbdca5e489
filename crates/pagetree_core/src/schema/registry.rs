//! Built-in content shapes for every block type.
//!
//! Content is a JSON object. Textual blocks carry an `inline` array of
//! inline nodes:
//!
//! - `{"type":"text","text":"..","marks":["bold",..]}`
//! - `{"type":"reference","documentId":"<uuid>","blockId":"<uuid>","alias":".."}`
//! - `{"type":"link","href":"..","children":[inline..]}`
//! - `{"type":"hard_break"}`
//! - `{"type":"math_inline","tex":".."}`
//!
//! Unknown object keys are ignored; unknown inline node types are not.

use crate::model::block::BlockType;
use crate::schema::{ContentValidator, SchemaViolation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

static LANGUAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_+#.\-]{0,31}$").expect("valid language regex")
});
static FOOTNOTE_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").expect("valid footnote label regex"));
static MIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]+/[A-Za-z0-9.+\-]+$").expect("valid mime regex")
});
static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+$").expect("valid href regex"));

const KNOWN_MARKS: &[&str] = &[
    "bold",
    "italic",
    "underline",
    "strike",
    "code",
    "highlight",
    "superscript",
    "subscript",
];

const MAX_HEADING_LEVEL: u64 = 6;

/// Default registry used by the patch engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockSchemaRegistry;

impl BlockSchemaRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl ContentValidator for BlockSchemaRegistry {
    fn validate(&self, block_type: BlockType, content: &Value) -> Result<(), SchemaViolation> {
        let path = "content";
        let object = expect_object(content, path)?;

        match block_type {
            BlockType::Paragraph => required_inline(object, "inline", path),
            BlockType::Heading => {
                let level_path = child(path, "level");
                let level = object
                    .get("level")
                    .ok_or_else(|| SchemaViolation::new(&level_path, "is required"))?;
                match level.as_u64() {
                    Some(level) if (1..=MAX_HEADING_LEVEL).contains(&level) => {}
                    _ => {
                        return Err(SchemaViolation::new(
                            level_path,
                            format!("must be an integer between 1 and {MAX_HEADING_LEVEL}"),
                        ))
                    }
                }
                required_inline(object, "inline", path)
            }
            BlockType::List => optional_bool(object, "ordered", path),
            BlockType::ListItem => {
                optional_inline(object, "inline", path)?;
                optional_bool(object, "checked", path)
            }
            BlockType::Blockquote | BlockType::ThematicBreak => Ok(()),
            BlockType::Callout => {
                optional_str(object, "title", path)?;
                optional_str(object, "icon", path)?;
                optional_inline(object, "inline", path)
            }
            BlockType::CodeBlock => {
                required_str(object, "code", path)?;
                if let Some(language) = optional_str(object, "language", path)? {
                    if !LANGUAGE_RE.is_match(language) {
                        return Err(SchemaViolation::new(
                            child(path, "language"),
                            "must be a short language tag",
                        ));
                    }
                }
                Ok(())
            }
            BlockType::Table => validate_table(object, path),
            BlockType::MathBlock => required_str(object, "tex", path).map(|_| ()),
            BlockType::FootnoteDef => {
                let label = required_str(object, "label", path)?;
                if !FOOTNOTE_LABEL_RE.is_match(label) {
                    return Err(SchemaViolation::new(
                        child(path, "label"),
                        "must be 1-64 characters of [A-Za-z0-9_-]",
                    ));
                }
                required_inline(object, "inline", path)
            }
            BlockType::Attachment => {
                let file_id = required_str(object, "fileId", path)?;
                if file_id.trim().is_empty() {
                    return Err(SchemaViolation::new(
                        child(path, "fileId"),
                        "must not be blank",
                    ));
                }
                optional_str(object, "name", path)?;
                if let Some(mime) = optional_str(object, "mime", path)? {
                    if !MIME_RE.is_match(mime) {
                        return Err(SchemaViolation::new(
                            child(path, "mime"),
                            "must be a media type such as `image/png`",
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

fn validate_table(object: &Map<String, Value>, path: &str) -> Result<(), SchemaViolation> {
    let rows_path = child(path, "rows");
    let rows = object
        .get("rows")
        .ok_or_else(|| SchemaViolation::new(&rows_path, "is required"))?
        .as_array()
        .ok_or_else(|| SchemaViolation::new(&rows_path, "must be an array of rows"))?;

    let mut width = None;
    for (row_index, row) in rows.iter().enumerate() {
        let row_path = index(&rows_path, row_index);
        let cells = row
            .as_array()
            .ok_or_else(|| SchemaViolation::new(&row_path, "must be an array of cells"))?;
        match width {
            None => width = Some(cells.len()),
            Some(expected) if expected != cells.len() => {
                return Err(SchemaViolation::new(
                    row_path,
                    format!("has {} cells, expected {expected}", cells.len()),
                ));
            }
            Some(_) => {}
        }
        for (cell_index, cell) in cells.iter().enumerate() {
            validate_inline_list(cell, &index(&row_path, cell_index))?;
        }
    }
    Ok(())
}

fn validate_inline_list(value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let nodes = value
        .as_array()
        .ok_or_else(|| SchemaViolation::new(path, "must be an array of inline nodes"))?;
    for (node_index, node) in nodes.iter().enumerate() {
        validate_inline_node(node, &index(path, node_index))?;
    }
    Ok(())
}

fn validate_inline_node(node: &Value, path: &str) -> Result<(), SchemaViolation> {
    let object = expect_object(node, path)?;
    let node_type = required_str(object, "type", path)?;

    match node_type {
        "text" => {
            required_str(object, "text", path)?;
            if let Some(marks) = present(object, "marks") {
                let marks_path = child(path, "marks");
                let marks = marks
                    .as_array()
                    .ok_or_else(|| SchemaViolation::new(&marks_path, "must be an array"))?;
                for (mark_index, mark) in marks.iter().enumerate() {
                    match mark.as_str() {
                        Some(mark) if KNOWN_MARKS.contains(&mark) => {}
                        _ => {
                            return Err(SchemaViolation::new(
                                index(&marks_path, mark_index),
                                format!("must be one of {}", KNOWN_MARKS.join(", ")),
                            ))
                        }
                    }
                }
            }
            Ok(())
        }
        "reference" => {
            let document_id = required_str(object, "documentId", path)?;
            if Uuid::parse_str(document_id).is_err() {
                return Err(SchemaViolation::new(
                    child(path, "documentId"),
                    "must be a UUID",
                ));
            }
            if let Some(block_id) = optional_str(object, "blockId", path)? {
                if Uuid::parse_str(block_id).is_err() {
                    return Err(SchemaViolation::new(child(path, "blockId"), "must be a UUID"));
                }
            }
            optional_str(object, "alias", path)?;
            Ok(())
        }
        "link" => {
            let href = required_str(object, "href", path)?;
            if !HREF_RE.is_match(href) {
                return Err(SchemaViolation::new(
                    child(path, "href"),
                    "must be non-empty and contain no whitespace",
                ));
            }
            let children_path = child(path, "children");
            let children = object
                .get("children")
                .ok_or_else(|| SchemaViolation::new(&children_path, "is required"))?;
            validate_inline_list(children, &children_path)
        }
        "hard_break" => Ok(()),
        "math_inline" => required_str(object, "tex", path).map(|_| ()),
        other => Err(SchemaViolation::new(
            child(path, "type"),
            format!("unknown inline node type `{other}`"),
        )),
    }
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaViolation> {
    value
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, "must be an object"))
}

/// Field value, treating explicit `null` as absent.
fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a str, SchemaViolation> {
    let field_path = child(path, key);
    present(object, key)
        .ok_or_else(|| SchemaViolation::new(&field_path, "is required"))?
        .as_str()
        .ok_or_else(|| SchemaViolation::new(field_path, "must be a string"))
}

fn optional_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<&'a str>, SchemaViolation> {
    match present(object, key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| SchemaViolation::new(child(path, key), "must be a string")),
    }
}

fn optional_bool(object: &Map<String, Value>, key: &str, path: &str) -> Result<(), SchemaViolation> {
    match present(object, key) {
        Some(value) if !value.is_boolean() => {
            Err(SchemaViolation::new(child(path, key), "must be a boolean"))
        }
        _ => Ok(()),
    }
}

fn required_inline(object: &Map<String, Value>, key: &str, path: &str) -> Result<(), SchemaViolation> {
    let field_path = child(path, key);
    let value = present(object, key).ok_or_else(|| SchemaViolation::new(&field_path, "is required"))?;
    validate_inline_list(value, &field_path)
}

fn optional_inline(object: &Map<String, Value>, key: &str, path: &str) -> Result<(), SchemaViolation> {
    match present(object, key) {
        None => Ok(()),
        Some(value) => validate_inline_list(value, &child(path, key)),
    }
}

fn child(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn index(path: &str, position: usize) -> String {
    format!("{path}[{position}]")
}
