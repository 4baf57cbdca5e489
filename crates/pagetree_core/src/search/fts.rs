//! SQLite FTS5-based block search.
//!
//! # Responsibility
//! - Maintain the `block_search` rows the FTS5 index mirrors.
//! - Provide keyword search over visible blocks.
//!
//! # Invariants
//! - Only visible blocks are returned (live block, live ancestors, live
//!   document).
//! - A block with empty extracted text has no `block_search` row.
//! - Result ordering is deterministic by rank and block id.

use crate::config::EngineConfig;
use crate::db::DbError;
use crate::model::block::BlockId;
use crate::model::document::DocumentId;
use crate::repo::{VISIBLE_BLOCKS_CTE, VISIBLE_DOCUMENT_BLOCKS_CTE};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for query parsing, DB interaction and result decoding.
#[derive(Debug)]
pub enum SearchError {
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery { .. } => None,
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Search options for full-text query behavior.
#[derive(Debug, Clone)]
pub struct BlockSearchQuery {
    /// User query text.
    pub text: String,
    /// Restrict hits to one document.
    pub document_id: Option<DocumentId>,
    /// Requested hit count; clamped by [`EngineConfig::effective_search_limit`].
    pub limit: Option<u32>,
    /// Whether to pass text directly as raw FTS5 expression.
    ///
    /// Default is `false` so type-as-you-search input never hits syntax
    /// errors.
    pub raw_fts_syntax: bool,
}

impl BlockSearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            document_id: None,
            limit: None,
            raw_fts_syntax: false,
        }
    }

    pub fn in_document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }
}

/// Single search hit returned by [`search_blocks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSearchHit {
    pub block_id: BlockId,
    pub document_id: DocumentId,
    pub snippet: String,
}

/// Writes (or clears, for empty text) the search row of one block.
pub fn replace_block_text(
    conn: &Connection,
    block_id: BlockId,
    document_id: DocumentId,
    plain_text: &str,
) -> SearchResult<()> {
    if plain_text.is_empty() {
        remove_block_text(conn, block_id)?;
        return Ok(());
    }

    conn.execute(
        "INSERT INTO block_search (block_id, document_id, plain_text)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(block_id) DO UPDATE SET
            document_id = excluded.document_id,
            plain_text = excluded.plain_text;",
        params![block_id.to_string(), document_id.to_string(), plain_text],
    )?;
    Ok(())
}

/// Removes the search row of one block, returning the number of rows removed.
pub fn remove_block_text(conn: &Connection, block_id: BlockId) -> SearchResult<usize> {
    let removed = conn.execute(
        "DELETE FROM block_search WHERE block_id = ?1;",
        [block_id.to_string()],
    )?;
    Ok(removed)
}

/// Searches visible blocks via FTS5 and returns ranked results.
///
/// Returns an empty list for blank queries.
pub fn search_blocks(
    conn: &Connection,
    query: &BlockSearchQuery,
    config: &EngineConfig,
) -> SearchResult<Vec<BlockSearchHit>> {
    let Some(match_expr) = build_match_expression(query) else {
        return Ok(Vec::new());
    };
    let limit = config.effective_search_limit(query.limit);

    // A scoped query only walks its own document's tree.
    let (visible_cte, mut bind_values) = match query.document_id {
        Some(document_id) => (
            VISIBLE_DOCUMENT_BLOCKS_CTE,
            vec![Value::Text(document_id.to_string())],
        ),
        None => (VISIBLE_BLOCKS_CTE, Vec::new()),
    };
    let match_param = bind_values.len() + 1;
    let limit_param = match_param + 1;
    bind_values.push(Value::Text(match_expr.clone()));
    bind_values.push(Value::Integer(i64::from(limit)));

    let sql = format!(
        "{visible_cte}
         SELECT
            block_search.block_id AS block_id,
            block_search.document_id AS document_id,
            snippet(block_search_fts, 0, '[', ']', ' ... ', 10) AS snippet
         FROM block_search_fts
         JOIN block_search ON block_search.id = block_search_fts.rowid
         JOIN visible ON visible.id = block_search.block_id
         WHERE block_search_fts MATCH ?{match_param}
         ORDER BY bm25(block_search_fts), block_search.block_id ASC
         LIMIT ?{limit_param}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut hits = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        hits.push(parse_search_hit(row)?);
    }

    Ok(hits)
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<BlockSearchHit> {
    let block_text: String = row.get("block_id")?;
    let block_id = Uuid::parse_str(&block_text)
        .map_err(|_| SearchError::InvalidData(format!("invalid block id `{block_text}`")))?;

    let document_text: String = row.get("document_id")?;
    let document_id = Uuid::parse_str(&document_text)
        .map_err(|_| SearchError::InvalidData(format!("invalid document id `{document_text}`")))?;

    Ok(BlockSearchHit {
        block_id,
        document_id,
        snippet: row.get("snippet")?,
    })
}

fn build_match_expression(query: &BlockSearchQuery) -> Option<String> {
    let text = query.text.trim();
    if text.is_empty() {
        return None;
    }

    if query.raw_fts_syntax {
        return Some(text.to_string());
    }

    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
                || msg.contains("no such column")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_match_expression, BlockSearchQuery};

    #[test]
    fn terms_are_quoted_and_joined() {
        let query = BlockSearchQuery::new(r#"  alpha  "beta  "#);
        assert_eq!(
            build_match_expression(&query).as_deref(),
            Some(r#""alpha" AND """beta""#)
        );
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert_eq!(build_match_expression(&BlockSearchQuery::new("   ")), None);
    }

    #[test]
    fn raw_syntax_passes_through() {
        let mut query = BlockSearchQuery::new("alpha OR beta*");
        query.raw_fts_syntax = true;
        assert_eq!(build_match_expression(&query).as_deref(), Some("alpha OR beta*"));
    }
}
