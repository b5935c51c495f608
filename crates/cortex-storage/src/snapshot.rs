//! Briefing snapshot cache (tier 1+).
//!
//! A snapshot caches the rendered briefing markdown per branch (empty
//! branch = all branches), with a TTL. At most one valid snapshot per
//! branch exists at a time; appends invalidate both the affected branch
//! and the empty-branch key.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use cortex_core::errors::CortexResult;
use cortex_core::time::{now_iso, parse_iso, to_iso};

use crate::to_storage_err;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: i64,
    pub git_branch: String,
    pub briefing_markdown: String,
    pub event_ids: Vec<String>,
    pub last_event_id: String,
    pub created_at: String,
    pub expires_at: String,
}

impl Snapshot {
    pub fn is_expired(&self) -> bool {
        match parse_iso(&self.expires_at) {
            Some(expires) => Utc::now() >= expires,
            // Unparseable expiry counts as expired.
            None => true,
        }
    }
}

/// Save a snapshot, replacing any existing row for the branch.
pub fn save_snapshot(
    conn: &Connection,
    branch: &str,
    markdown: &str,
    event_ids: &[String],
    last_event_id: &str,
    ttl_hours: f64,
) -> CortexResult<i64> {
    let now = Utc::now();
    let expires = now + Duration::seconds((ttl_hours * 3600.0) as i64);

    conn.execute("DELETE FROM snapshots WHERE git_branch = ?1", params![branch])
        .map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO snapshots (
            git_branch, briefing_markdown, event_ids, last_event_id, created_at, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            branch,
            markdown,
            serde_json::to_string(event_ids)?,
            last_event_id,
            to_iso(now),
            to_iso(expires),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Non-expired snapshot for a branch, newest first.
pub fn get_valid_snapshot(conn: &Connection, branch: &str) -> CortexResult<Option<Snapshot>> {
    let row = conn
        .query_row(
            "SELECT id, git_branch, briefing_markdown, event_ids, last_event_id,
                    created_at, expires_at
             FROM snapshots
             WHERE git_branch = ?1 AND expires_at > ?2
             ORDER BY created_at DESC
             LIMIT 1",
            params![branch, now_iso()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(row.map(
        |(id, git_branch, briefing_markdown, ids_json, last_event_id, created_at, expires_at)| {
            Snapshot {
                id,
                git_branch,
                briefing_markdown,
                event_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
                last_event_id,
                created_at,
                expires_at,
            }
        },
    ))
}

/// Delete snapshots for a branch, or every snapshot when `branch` is None.
/// A branch invalidation also removes the all-branches key: new events on
/// any branch stale the global briefing too.
pub fn invalidate_snapshots(conn: &Connection, branch: Option<&str>) -> CortexResult<usize> {
    let deleted = match branch {
        None => conn
            .execute("DELETE FROM snapshots", [])
            .map_err(|e| to_storage_err(e.to_string()))?,
        Some(b) => conn
            .execute(
                "DELETE FROM snapshots WHERE git_branch = ?1 OR git_branch = ''",
                params![b],
            )
            .map_err(|e| to_storage_err(e.to_string()))?,
    };
    Ok(deleted)
}

/// Remove expired snapshots; bounds table growth.
pub fn cleanup_expired_snapshots(conn: &Connection) -> CortexResult<usize> {
    conn.execute(
        "DELETE FROM snapshots WHERE expires_at <= ?1",
        params![now_iso()],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Snapshot counts for `cortex status`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStats {
    pub total_count: usize,
    pub valid_count: usize,
    pub branches: Vec<String>,
}

pub fn snapshot_stats(conn: &Connection) -> CortexResult<SnapshotStats> {
    let now = now_iso();
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let valid: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM snapshots WHERE expires_at > ?1",
            params![now],
            |r| r.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut stmt = conn
        .prepare("SELECT DISTINCT git_branch FROM snapshots WHERE expires_at > ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let branches = stmt
        .query_map(params![now], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(SnapshotStats {
        total_count: total as usize,
        valid_count: valid as usize,
        branches,
    })
}
