//! Hybrid retrieval: keyword + vector fused by Reciprocal Rank Fusion.
//!
//! `score = w_kw/(k + rank_kw) + w_vec/(k + rank_vec)`, missing ranks
//! contributing zero. Each subsystem over-fetches 2× the requested limit
//! to give the fusion room; when only one input is usable the result
//! degrades to that subsystem's ranking.

use std::collections::HashMap;

use rusqlite::Connection;

use cortex_core::errors::CortexResult;
use cortex_core::event::{Event, EventType};
use cortex_storage::load_event_by_id;

use crate::search::keyword::{search, SearchResult};
use crate::search::vector::{search_similar, VectorHit};

/// Standard RRF smoothing constant. Higher values flatten the influence
/// of top ranks from any single list.
pub const DEFAULT_RRF_K: u32 = 60;

/// A fused result with per-source rank provenance.
#[derive(Debug, Clone)]
pub struct HybridResult {
    pub event: Event,
    /// 1-indexed rank in keyword results, `None` if keyword missed it.
    pub fts_rank: Option<usize>,
    /// 1-indexed rank in vector results, `None` if vector missed it.
    pub vec_rank: Option<usize>,
    /// Fused RRF score — higher is more relevant.
    pub rrf_score: f64,
    /// BM25 magnitude, when keyword matched.
    pub fts_score: Option<f64>,
    /// Vector similarity, when vector matched.
    pub similarity: Option<f64>,
    /// FTS snippet, or a content preview for vector-only hits.
    pub snippet: String,
}

#[allow(clippy::too_many_arguments)]
pub fn hybrid_search(
    conn: &Connection,
    query: &str,
    query_embedding: Option<&[f32]>,
    limit: usize,
    k: u32,
    fts_weight: f64,
    vec_weight: f64,
    event_type: Option<EventType>,
    branch: Option<&str>,
    min_confidence: f64,
) -> CortexResult<Vec<HybridResult>> {
    let fts_results: Vec<SearchResult> = if query.trim().is_empty() {
        Vec::new()
    } else {
        search(conn, query, limit * 2, event_type, branch)?
    };

    let vec_results: Vec<VectorHit> = match query_embedding {
        Some(embedding) => search_similar(
            conn,
            embedding,
            limit * 2,
            event_type,
            branch,
            min_confidence,
        )?,
        None => Vec::new(),
    };

    if fts_results.is_empty() && vec_results.is_empty() {
        return Ok(Vec::new());
    }

    let mut fts_map: HashMap<String, (usize, &SearchResult)> = HashMap::new();
    for (index, result) in fts_results.iter().enumerate() {
        fts_map.insert(result.event.id.clone(), (index + 1, result));
    }
    let mut vec_map: HashMap<String, (usize, &VectorHit)> = HashMap::new();
    for (index, hit) in vec_results.iter().enumerate() {
        vec_map.insert(hit.event_id.clone(), (index + 1, hit));
    }

    let mut ids: Vec<String> = Vec::new();
    for result in &fts_results {
        ids.push(result.event.id.clone());
    }
    for hit in &vec_results {
        if !fts_map.contains_key(&hit.event_id) {
            ids.push(hit.event_id.clone());
        }
    }

    let mut fused = Vec::with_capacity(ids.len());
    for id in ids {
        let keyword = fts_map.get(&id);
        let vector = vec_map.get(&id);

        let event = match keyword {
            Some((_, result)) => result.event.clone(),
            None => match load_event_by_id(conn, &id)? {
                Some(event) => event,
                // Row vanished between the scans; drop the hit.
                None => continue,
            },
        };

        let fts_rank = keyword.map(|(rank, _)| *rank);
        let vec_rank = vector.map(|(rank, _)| *rank);
        let rrf_score = rrf(fts_rank, vec_rank, k, fts_weight, vec_weight);

        let snippet = match keyword {
            Some((_, result)) if !result.snippet.is_empty() => result.snippet.clone(),
            _ => event.content.chars().take(150).collect(),
        };

        fused.push(HybridResult {
            fts_score: keyword.map(|(_, result)| result.score),
            similarity: vector.map(|(_, hit)| hit.similarity),
            event,
            fts_rank,
            vec_rank,
            rrf_score,
            snippet,
        });
    }

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    Ok(fused)
}

fn rrf(
    fts_rank: Option<usize>,
    vec_rank: Option<usize>,
    k: u32,
    fts_weight: f64,
    vec_weight: f64,
) -> f64 {
    let mut score = 0.0;
    if let Some(rank) = fts_rank {
        score += fts_weight / (f64::from(k) + rank as f64);
    }
    if let Some(rank) = vec_rank {
        score += vec_weight / (f64::from(k) + rank as f64);
    }
    score
}
