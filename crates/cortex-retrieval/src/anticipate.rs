//! Anticipatory retrieval (tier 2+).
//!
//! On each user prompt, embed the prompt and run hybrid search over prior
//! events, then write a small relevance capsule next to the briefing. No
//! secondary model calls: retrieval is local embeddings plus SQLite.

use std::path::Path;

use cortex_core::config::CortexConfig;
use cortex_core::errors::CortexResult;
use cortex_core::fsio::write_atomic;
use cortex_embeddings::EmbeddingEngine;
use cortex_storage::EventStorage;
use tracing::debug;

use crate::search::hybrid::{hybrid_search, HybridResult, DEFAULT_RRF_K};

/// How many events a capsule may carry.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Character cap for the capsule; the briefing holds the overview, this
/// stays focused.
pub const MAX_RELEVANT_CONTEXT_CHARS: usize = 2000;

/// Outcome of an anticipatory retrieval.
#[derive(Debug)]
pub struct RetrievalResult {
    pub results: Vec<HybridResult>,
    pub prompt: String,
    pub branch: String,
}

/// Retrieve events relevant to a prompt.
///
/// Returns `None` (no capsule) when the tier is below 2, the prompt is
/// blank, the store is not SQLite-backed, the embedding engine cannot
/// produce a vector, or nothing matched.
pub fn retrieve_relevant_context(
    store: &dyn EventStorage,
    config: &CortexConfig,
    engine: &EmbeddingEngine,
    prompt: &str,
    branch: Option<&str>,
    limit: usize,
) -> CortexResult<Option<RetrievalResult>> {
    if prompt.trim().is_empty() {
        return Ok(None);
    }
    if config.storage_tier < 2 {
        debug!("anticipatory retrieval requires tier 2+");
        return Ok(None);
    }
    let Some(sqlite) = store.as_sqlite() else {
        debug!("anticipatory retrieval requires the SQLite store");
        return Ok(None);
    };
    let Some(query_embedding) = engine.embed(prompt) else {
        debug!("no embedding for prompt, skipping anticipatory retrieval");
        return Ok(None);
    };

    let results = hybrid_search(
        sqlite.conn(),
        prompt,
        Some(&query_embedding),
        limit,
        DEFAULT_RRF_K,
        0.5,
        0.5,
        None,
        branch.filter(|b| !b.is_empty()),
        0.0,
    )?;

    if results.is_empty() {
        return Ok(None);
    }
    Ok(Some(RetrievalResult {
        results,
        prompt: prompt.to_string(),
        branch: branch.unwrap_or("").to_string(),
    }))
}

/// Format a capsule as markdown under `max_chars`; overflow appends a
/// truncation notice instead of more items.
pub fn format_relevant_context(retrieval: &RetrievalResult, max_chars: usize) -> String {
    if retrieval.results.is_empty() {
        return String::new();
    }

    let header = "# Relevant Context\n\n_Anticipatory retrieval based on your message:_\n\n";
    if header.len() > max_chars {
        return String::new();
    }
    let mut out = String::from(header);

    let mut emitted = 0usize;
    for result in &retrieval.results {
        let type_label = result.event.event_type.title();

        let mut content = if result.snippet.is_empty() {
            result.event.content.chars().take(150).collect()
        } else {
            result.snippet.clone()
        };
        if content.chars().count() > 150 {
            content = content.chars().take(147).collect();
            content.push_str("...");
        }

        let mut ranks = Vec::new();
        if let Some(rank) = result.fts_rank {
            ranks.push(format!("keyword #{rank}"));
        }
        if let Some(rank) = result.vec_rank {
            ranks.push(format!("semantic #{rank}"));
        }
        let relevance = if ranks.is_empty() {
            String::new()
        } else {
            format!(" ({})", ranks.join(", "))
        };

        let line = format!("- **{type_label}**{relevance}: {content}\n");
        if out.len() + line.len() > max_chars {
            let remaining = retrieval.results.len() - emitted;
            let notice = format!("\n_({remaining} more results truncated)_\n");
            if out.len() + notice.len() <= max_chars {
                out.push_str(&notice);
            }
            break;
        }
        out.push_str(&line);
        emitted += 1;
    }

    out
}

/// Retrieve and write the capsule file; the UserPromptSubmit entry point.
///
/// Returns true when a capsule was written. With nothing to write, any
/// stale capsule at `output_path` is deleted so old context does not
/// bleed into new prompts.
pub fn write_relevant_context_to_file(
    output_path: &Path,
    store: &dyn EventStorage,
    config: &CortexConfig,
    engine: &EmbeddingEngine,
    prompt: &str,
    branch: Option<&str>,
) -> CortexResult<bool> {
    let retrieval = retrieve_relevant_context(
        store,
        config,
        engine,
        prompt,
        branch,
        DEFAULT_RETRIEVAL_LIMIT,
    )?;

    let content = retrieval
        .as_ref()
        .map(|r| format_relevant_context(r, MAX_RELEVANT_CONTEXT_CHARS))
        .unwrap_or_default();

    if content.is_empty() {
        if output_path.exists() {
            let _ = std::fs::remove_file(output_path);
        }
        return Ok(false);
    }

    write_atomic(output_path, &content)?;
    Ok(true)
}
