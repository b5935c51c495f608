//! Vector similarity search over the `embedding` column.
//!
//! A brute-force scan: embeddings are decoded in memory and compared by L2
//! distance (equivalent to cosine ordering on the normalised vectors the
//! providers emit). `exp(-distance)` maps distance to a 0–1 similarity.
//! At per-project event counts a full scan stays well inside hook latency
//! targets and avoids a native-extension failure mode.

use rusqlite::Connection;

use cortex_core::errors::CortexResult;
use cortex_core::event::EventType;
use cortex_storage::vectors::deserialize_embedding;

use crate::search::keyword::sql_err;

/// A vector search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub event_id: String,
    /// L2 distance — lower is more similar.
    pub distance: f64,
    /// `exp(-distance)` — higher is more similar.
    pub similarity: f64,
}

/// Nearest events to a query embedding, most similar first. Events whose
/// stored dimensionality differs from the query are skipped. The branch
/// filter keeps branchless events, matching keyword search scoping.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
    event_type: Option<EventType>,
    branch: Option<&str>,
    min_confidence: f64,
) -> CortexResult<Vec<VectorHit>> {
    if query_embedding.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from("SELECT id, embedding FROM events WHERE embedding IS NOT NULL");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ty) = event_type {
        sql.push_str(&format!(" AND type = ?{}", params.len() + 1));
        params.push(Box::new(ty.as_str().to_string()));
    }
    if let Some(b) = branch {
        sql.push_str(&format!(
            " AND (git_branch = ?{n} OR git_branch = '')",
            n = params.len() + 1
        ));
        params.push(Box::new(b.to_string()));
    }
    if min_confidence > 0.0 {
        sql.push_str(&format!(" AND confidence >= ?{}", params.len() + 1));
        params.push(Box::new(min_confidence));
    }

    let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(sql_err)?;

    let mut hits = Vec::new();
    for row in rows {
        let (event_id, blob) = row.map_err(sql_err)?;
        let stored = deserialize_embedding(&blob);
        if stored.len() != query_embedding.len() {
            continue;
        }
        let distance = l2_distance(query_embedding, &stored);
        hits.push(VectorHit {
            event_id,
            distance,
            similarity: (-distance).exp(),
        });
    }

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    Ok(hits)
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
