//! Embedding storage on the tier-2 `embedding` column.
//!
//! Vectors are little-endian float32 blobs. Backfill walks events lacking
//! embeddings newest-first, embeds in batches, and commits per batch so an
//! interrupted run resumes where it stopped.

use rusqlite::{params, Connection, OptionalExtension};

use cortex_core::errors::CortexResult;
use cortex_embeddings::EmbeddingEngine;
use tracing::warn;

use crate::to_storage_err;

/// Serialize an embedding for BLOB storage (little-endian f32).
pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize a BLOB back into a vector. Trailing partial floats are
/// dropped.
pub fn deserialize_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Store an embedding for an event.
pub fn store_embedding(conn: &Connection, event_id: &str, embedding: &[f32]) -> CortexResult<()> {
    conn.execute(
        "UPDATE events SET embedding = ?1 WHERE id = ?2",
        params![serialize_embedding(embedding), event_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Fetch an event's embedding, `None` if absent.
pub fn get_embedding(conn: &Connection, event_id: &str) -> CortexResult<Option<Vec<f32>>> {
    let blob: Option<Option<Vec<u8>>> = conn
        .query_row(
            "SELECT embedding FROM events WHERE id = ?1",
            params![event_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(blob.flatten().map(|b| deserialize_embedding(&b)))
}

/// Number of events carrying an embedding.
pub fn count_embeddings(conn: &Connection) -> CortexResult<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM events WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(n as usize)
}

/// Events still needing embeddings, newest first: `(id, content)` pairs.
pub fn events_without_embeddings(
    conn: &Connection,
    limit: usize,
) -> CortexResult<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, content FROM events
             WHERE embedding IS NULL AND content != ''
             ORDER BY created_at DESC
             LIMIT ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(out)
}

/// Generate embeddings for every event that lacks one.
///
/// Returns the number generated. Each batch commits independently;
/// `progress` (done, total) fires after each batch.
pub fn backfill_embeddings(
    conn: &Connection,
    engine: &EmbeddingEngine,
    batch_size: usize,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> CortexResult<usize> {
    if !engine.is_available() {
        warn!("embedding engine unavailable, skipping backfill");
        return Ok(0);
    }

    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM events WHERE embedding IS NULL AND content != ''",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let total = total as usize;
    if total == 0 {
        return Ok(0);
    }

    let mut generated = 0usize;
    loop {
        let pending = events_without_embeddings(conn, batch_size)?;
        if pending.is_empty() {
            break;
        }
        let contents: Vec<String> = pending.iter().map(|(_, c)| c.clone()).collect();
        let embeddings = engine.embed_batch(&contents);

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("backfill begin: {e}")))?;
        let mut stored_in_batch = 0usize;
        for ((id, _), embedding) in pending.iter().zip(embeddings) {
            if let Some(vector) = embedding {
                tx.execute(
                    "UPDATE events SET embedding = ?1 WHERE id = ?2",
                    params![serialize_embedding(&vector), id],
                )
                .map_err(|e| to_storage_err(e.to_string()))?;
                stored_in_batch += 1;
            }
        }
        tx.commit()
            .map_err(|e| to_storage_err(format!("backfill commit: {e}")))?;

        generated += stored_in_batch;
        if let Some(cb) = progress.as_deref_mut() {
            cb(generated, total);
        }
        // A batch where nothing embedded would loop forever on the same
        // rows; stop and leave them for a later run.
        if stored_in_batch == 0 {
            break;
        }
    }
    Ok(generated)
}
