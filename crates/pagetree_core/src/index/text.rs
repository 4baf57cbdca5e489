//! Plain-text projection of block content for the search index.

use crate::model::block::BlockType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Extracts searchable text from one block's content.
///
/// Inline text runs concatenate as written (marks split runs mid-word), and
/// separate fields or table cells are joined with a space. Container types
/// (`list`, `blockquote`) and non-textual types contribute nothing; their
/// children are indexed on their own. Output has collapsed whitespace and
/// may be empty.
pub fn extract_plain_text(block_type: BlockType, content: &Value) -> String {
    let mut pieces: Vec<String> = Vec::new();

    match block_type {
        BlockType::Paragraph
        | BlockType::Heading
        | BlockType::ListItem
        | BlockType::FootnoteDef => push_inline_field(&mut pieces, content, "inline"),
        BlockType::Callout => {
            if let Some(title) = content.get("title").and_then(Value::as_str) {
                pieces.push(title.to_string());
            }
            push_inline_field(&mut pieces, content, "inline");
        }
        BlockType::CodeBlock => {
            if let Some(code) = content.get("code").and_then(Value::as_str) {
                pieces.push(code.to_string());
            }
        }
        BlockType::Table => {
            let rows = content.get("rows").and_then(Value::as_array);
            for row in rows.into_iter().flatten() {
                for cell in row.as_array().into_iter().flatten() {
                    let mut text = String::new();
                    append_inline(&mut text, cell);
                    pieces.push(text);
                }
            }
        }
        BlockType::Attachment => {
            if let Some(name) = content.get("name").and_then(Value::as_str) {
                pieces.push(name.to_string());
            }
        }
        BlockType::List
        | BlockType::Blockquote
        | BlockType::ThematicBreak
        | BlockType::MathBlock => {}
    }

    let joined = pieces.join(" ");
    WHITESPACE_RE.replace_all(joined.trim(), " ").into_owned()
}

fn push_inline_field(pieces: &mut Vec<String>, content: &Value, key: &str) {
    if let Some(inline) = content.get(key) {
        let mut text = String::new();
        append_inline(&mut text, inline);
        pieces.push(text);
    }
}

fn append_inline(out: &mut String, nodes: &Value) {
    for node in nodes.as_array().into_iter().flatten() {
        match node.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = node.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            Some("reference") => {
                if let Some(alias) = node.get("alias").and_then(Value::as_str) {
                    out.push_str(alias);
                }
            }
            Some("link") => {
                if let Some(children) = node.get("children") {
                    append_inline(out, children);
                }
            }
            Some("hard_break") => out.push(' '),
            _ => {}
        }
    }
}
