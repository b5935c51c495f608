//! SQLite connection management, schema, and migrations.
//!
//! Every connection runs in WAL journal mode with NORMAL sync so readers
//! proceed during writes (overlapping hooks must not block each other).
//! `schema_version` tracks migrations: v1 is the tier-1 schema (events,
//! FTS5, snapshots, hook_state), v2 adds the embedding column for tier 2.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use cortex_core::config::{project_dir, CortexConfig};
use cortex_core::errors::CortexResult;
use cortex_core::time::now_iso;

use crate::to_storage_err;

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 2;

/// Path to a project's SQLite database.
pub fn db_path(project_hash: &str, config: &CortexConfig) -> CortexResult<PathBuf> {
    Ok(project_dir(project_hash, config)?.join("events.db"))
}

/// Open a connection with pragmas applied and the schema initialised.
pub fn open(path: &Path) -> CortexResult<Connection> {
    let conn = Connection::open(path).map_err(|e| to_storage_err(format!("open: {e}")))?;
    apply_pragmas(&conn)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Apply performance and safety pragmas to a connection.
pub fn apply_pragmas(conn: &Connection) -> CortexResult<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(|e| to_storage_err(format!("pragmas: {e}")))?;
    Ok(())
}

/// Create all tables and indexes. Idempotent — safe on every open.
pub fn initialize_schema(conn: &Connection) -> CortexResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL DEFAULT '',
            project TEXT NOT NULL DEFAULT '',
            git_branch TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}',
            salience REAL NOT NULL DEFAULT 0.5,
            confidence REAL NOT NULL DEFAULT 1.0,
            created_at TEXT NOT NULL,
            accessed_at TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            immortal INTEGER NOT NULL DEFAULT 0,
            provenance TEXT NOT NULL DEFAULT '',
            embedding BLOB DEFAULT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
        CREATE INDEX IF NOT EXISTS idx_events_immortal ON events(immortal) WHERE immortal = 1;
        CREATE INDEX IF NOT EXISTS idx_events_git_branch ON events(git_branch);
        CREATE INDEX IF NOT EXISTS idx_events_session_id ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_salience ON events(salience DESC);

        -- Shaped like the dedup key so hash recomputation stays in cache.
        CREATE INDEX IF NOT EXISTS idx_events_content_hash
            ON events(type, substr(content, 1, 100), session_id);

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            git_branch TEXT NOT NULL DEFAULT '',
            briefing_markdown TEXT NOT NULL,
            event_ids TEXT NOT NULL,
            last_event_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_branch
            ON snapshots(git_branch, created_at DESC);

        CREATE TABLE IF NOT EXISTS hook_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| to_storage_err(format!("schema: {e}")))?;

    initialize_fts(conn)?;
    run_migrations(conn)?;
    record_schema_version(conn)?;
    Ok(())
}

/// Create the FTS5 external-content table and its sync triggers.
/// `CREATE VIRTUAL TABLE` has no clean `IF NOT EXISTS`, so existence is
/// checked against sqlite_master first.
fn initialize_fts(conn: &Connection) -> CortexResult<()> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'events_fts'",
            [],
            |row| row.get::<_, i64>(0).map(|n| n > 0),
        )
        .map_err(|e| to_storage_err(format!("fts check: {e}")))?;
    if exists {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE VIRTUAL TABLE events_fts USING fts5(
            content,
            content='events',
            content_rowid='rowid'
        );

        CREATE TRIGGER events_fts_ai AFTER INSERT ON events BEGIN
            INSERT INTO events_fts(rowid, content) VALUES (new.rowid, new.content);
        END;

        CREATE TRIGGER events_fts_ad AFTER DELETE ON events BEGIN
            INSERT INTO events_fts(events_fts, rowid, content)
                VALUES('delete', old.rowid, old.content);
        END;

        CREATE TRIGGER events_fts_au AFTER UPDATE ON events BEGIN
            INSERT INTO events_fts(events_fts, rowid, content)
                VALUES('delete', old.rowid, old.content);
            INSERT INTO events_fts(rowid, content) VALUES (new.rowid, new.content);
        END;
        ",
    )
    .map_err(|e| to_storage_err(format!("fts create: {e}")))?;
    Ok(())
}

/// Bring an existing database up to the current schema version.
fn run_migrations(conn: &Connection) -> CortexResult<()> {
    if schema_version(conn) < 2 {
        migrate_v1_to_v2(conn)?;
    }
    Ok(())
}

/// v1 → v2: add the embedding column.
fn migrate_v1_to_v2(conn: &Connection) -> CortexResult<()> {
    let mut has_embedding = false;
    let mut stmt = conn
        .prepare("PRAGMA table_info(events)")
        .map_err(|e| to_storage_err(format!("table_info: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| to_storage_err(format!("table_info query: {e}")))?;
    while let Some(row) = rows.next().map_err(|e| to_storage_err(e.to_string()))? {
        let name: String = row.get(1).map_err(|e| to_storage_err(e.to_string()))?;
        if name == "embedding" {
            has_embedding = true;
        }
    }
    if has_embedding {
        return Ok(());
    }

    conn.execute("ALTER TABLE events ADD COLUMN embedding BLOB DEFAULT NULL", [])
        .map_err(|e| to_storage_err(format!("add embedding column: {e}")))?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version, applied_at, description)
         VALUES (2, ?1, 'Tier 2: added embedding column for vector search')",
        [now_iso()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

fn record_schema_version(conn: &Connection) -> CortexResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description)
         VALUES (?1, ?2, 'Tier 2 schema: events, FTS5, snapshots, hook_state, embedding')",
        rusqlite::params![SCHEMA_VERSION, now_iso()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Highest recorded schema version, 0 for an uninitialised database.
pub fn schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Rebuild the FTS index from the events table. Recovers a
/// desynchronised index; returns the number of indexed events.
pub fn rebuild_fts_index(conn: &Connection) -> CortexResult<usize> {
    conn.execute("INSERT INTO events_fts(events_fts) VALUES('rebuild')", [])
        .map_err(|e| to_storage_err(format!("fts rebuild: {e}")))?;
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count as usize)
}

/// Aggregate statistics for `cortex status` and the query server.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub event_count: usize,
    pub schema_version: i64,
    pub fts_enabled: bool,
    pub snapshot_count: usize,
    pub events_with_embeddings: usize,
}

pub fn database_stats(conn: &Connection) -> CortexResult<DatabaseStats> {
    let count = |sql: &str| -> CortexResult<usize> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|e| to_storage_err(e.to_string()))
    };
    Ok(DatabaseStats {
        event_count: count("SELECT COUNT(*) FROM events")?,
        schema_version: schema_version(conn),
        fts_enabled: count(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'events_fts'",
        )? > 0,
        snapshot_count: count("SELECT COUNT(*) FROM snapshots")?,
        events_with_embeddings: count("SELECT COUNT(*) FROM events WHERE embedding IS NOT NULL")?,
    })
}
