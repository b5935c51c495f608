//! BM25 keyword search over the FTS5 index.
//!
//! Queries are escape-normalised before hitting `MATCH`; anything the FTS
//! parser still rejects yields an empty result set rather than an error.
//! BM25 reports smaller-is-better negative scores; results carry `|bm25|`
//! so callers can treat higher as better.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;

use cortex_core::errors::CortexResult;
use cortex_core::event::{Event, EventType};
use cortex_storage::{parse_event_row, EVENT_COLUMNS};
use tracing::debug;

/// A keyword search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub event: Event,
    /// `|bm25|` — higher is more relevant.
    pub score: f64,
    /// Content excerpt with `**` match highlighting.
    pub snippet: String,
}

/// Search events with BM25 ranking and optional type/branch filters.
/// The branch filter keeps branchless events, matching briefing scoping.
pub fn search(
    conn: &Connection,
    query: &str,
    limit: usize,
    event_type: Option<EventType>,
    branch: Option<&str>,
) -> CortexResult<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let safe_query = escape_fts_query(query);

    let mut sql = format!(
        "SELECT {cols}, bm25(events_fts) AS score,
                snippet(events_fts, 0, '**', '**', '...', 32) AS snippet
         FROM events_fts
         JOIN events e ON events_fts.rowid = e.rowid
         WHERE events_fts MATCH ?1",
        cols = qualified_columns()
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(safe_query)];

    if let Some(ty) = event_type {
        sql.push_str(&format!(" AND e.type = ?{}", params.len() + 1));
        params.push(Box::new(ty.as_str().to_string()));
    }
    if let Some(b) = branch {
        sql.push_str(&format!(
            " AND (e.git_branch = ?{n} OR e.git_branch = '' OR e.git_branch IS NULL)",
            n = params.len() + 1
        ));
        params.push(Box::new(b.to_string()));
    }
    sql.push_str(&format!(" ORDER BY score LIMIT ?{}", params.len() + 1));
    params.push(Box::new(limit as i64));

    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(e) if is_fts_syntax_error(&e) => return Ok(Vec::new()),
        Err(e) => return Err(sql_err(e)),
    };
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let event = parse_event_row(row)?;
        let score: f64 = row.get(14)?;
        let snippet: Option<String> = row.get(15)?;
        Ok(SearchResult {
            snippet: snippet.unwrap_or_else(|| truncate(&event.content, 100)),
            event,
            score: score.abs(),
        })
    });

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) if is_fts_syntax_error(&e) => return Ok(Vec::new()),
        Err(e) => return Err(sql_err(e)),
    };

    let mut results = Vec::new();
    for row in rows {
        match row {
            Ok(result) => results.push(result),
            Err(e) if is_fts_syntax_error(&e) => {
                debug!(error = %e, "invalid FTS query, returning empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(sql_err(e)),
        }
    }
    Ok(results)
}

/// Events similar to a source event: its strongest terms OR-joined into a
/// keyword query, with the source itself excluded.
pub fn similar_events(
    conn: &Connection,
    event: &Event,
    limit: usize,
) -> CortexResult<Vec<SearchResult>> {
    let terms = extract_search_terms(&event.content);
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let query = terms
        .iter()
        .take(5)
        .cloned()
        .collect::<Vec<_>>()
        .join(" OR ");
    let results = search(conn, &query, limit + 1, None, None)?;
    Ok(results
        .into_iter()
        .filter(|r| r.event.id != event.id)
        .take(limit)
        .collect())
}

/// Wrap the query in double quotes (with internal quotes doubled) when it
/// contains FTS5 operator characters, turning it into a phrase search;
/// plain queries pass through.
fn escape_fts_query(query: &str) -> String {
    const SPECIALS: &[char] = &['"', '(', ')', ':', '-', '^'];
    if query.contains(SPECIALS) {
        format!("\"{}\"", query.replace('"', "\"\""))
    } else {
        query.to_string()
    }
}

fn is_fts_syntax_error(error: &rusqlite::Error) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("fts5") || message.contains("syntax")
}

pub(crate) fn sql_err(error: rusqlite::Error) -> cortex_core::errors::CortexError {
    cortex_core::errors::SearchError::Query {
        message: error.to_string(),
    }
    .into()
}

fn qualified_columns() -> String {
    EVENT_COLUMNS
        .split(',')
        .map(|c| format!("e.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]{2,}\b").expect("word regex"));

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "are", "was", "were", "been", "have",
    "has", "had", "will", "would", "could", "should", "can", "may", "not", "but", "use", "using",
];

/// Meaningful terms from content: stopword-filtered, deduplicated, longest
/// first (longer terms are usually more specific).
fn extract_search_terms(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms: Vec<String> = WORD
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .filter(|w| {
            let lower = w.to_lowercase();
            !STOPWORDS.contains(&lower.as_str()) && seen.insert(lower)
        })
        .collect();
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
    terms
}
