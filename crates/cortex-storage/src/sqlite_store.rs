//! Tier-1+ event store backed by SQLite.
//!
//! Appends are hash-deduplicated and committed in a single transaction;
//! snapshot invalidation for the affected branches happens inside that
//! same transaction so a reader can never observe fresh events alongside
//! a stale cached briefing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use cortex_core::config::CortexConfig;
use cortex_core::errors::CortexResult;
use cortex_core::event::{content_hash, hash_parts, Event, EventType};
use cortex_core::time::now_iso;
use cortex_embeddings::EmbeddingEngine;

use crate::{db, snapshot, to_storage_err, vectors};
use crate::{select_for_briefing, BriefingEvents, EventStorage};

/// Column list every event query selects, in [`parse_event_row`] order.
pub const EVENT_COLUMNS: &str = "id, session_id, project, git_branch, type, content, metadata, \
     salience, confidence, created_at, accessed_at, access_count, immortal, provenance";

pub struct SqliteEventStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteEventStore {
    /// Open (and if needed create) the store for a project.
    pub fn open(project_hash: &str, config: &CortexConfig) -> CortexResult<Self> {
        let path = db::db_path(project_hash, config)?;
        Self::open_at(&path)
    }

    /// Open at an explicit database path (tests, migration).
    pub fn open_at(path: &Path) -> CortexResult<Self> {
        Ok(Self {
            conn: db::open(path)?,
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The raw connection, for the search layer and snapshot cache.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Tier 2: embedding operations ─────────────────────────────────────

    pub fn store_embedding(&self, event_id: &str, embedding: &[f32]) -> CortexResult<()> {
        vectors::store_embedding(&self.conn, event_id, embedding)
    }

    pub fn get_embedding(&self, event_id: &str) -> CortexResult<Option<Vec<f32>>> {
        vectors::get_embedding(&self.conn, event_id)
    }

    pub fn count_embeddings(&self) -> CortexResult<usize> {
        vectors::count_embeddings(&self.conn)
    }

    pub fn backfill_embeddings(
        &self,
        engine: &EmbeddingEngine,
        batch_size: usize,
        progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> CortexResult<usize> {
        vectors::backfill_embeddings(&self.conn, engine, batch_size, progress)
    }

    // ── Row plumbing ─────────────────────────────────────────────────────

    fn load_where(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> CortexResult<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events {clause}");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| to_storage_err(e.to_string()))?;
        let rows = stmt
            .query_map(params, parse_event_row)
            .map_err(|e| to_storage_err(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|e| to_storage_err(e.to_string()))?);
        }
        Ok(events)
    }

    /// Content hashes of everything in the store, from the three dedup key
    /// columns only.
    fn load_content_hashes(&self) -> CortexResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, content, session_id FROM events")
            .map_err(|e| to_storage_err(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(hash_parts(
                    row.get::<_, String>(0)?.as_str(),
                    row.get::<_, String>(1)?.as_str(),
                    row.get::<_, String>(2)?.as_str(),
                ))
            })
            .map_err(|e| to_storage_err(e.to_string()))?;

        let mut hashes = HashSet::new();
        for row in rows {
            hashes.insert(row.map_err(|e| to_storage_err(e.to_string()))?);
        }
        Ok(hashes)
    }
}

/// Load a single event by id.
pub fn load_event_by_id(conn: &Connection, id: &str) -> CortexResult<Option<Event>> {
    use rusqlite::OptionalExtension;
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
    conn.query_row(&sql, params![id], parse_event_row)
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Map a row (in [`EVENT_COLUMNS`] order) to an [`Event`].
pub fn parse_event_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let type_raw: String = row.get(4)?;
    let event_type = EventType::parse(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown event type: {type_raw}").into(),
        )
    })?;
    let metadata_raw: String = row.get(6)?;

    Ok(Event {
        id: row.get(0)?,
        session_id: row.get(1)?,
        project: row.get(2)?,
        git_branch: row.get(3)?,
        event_type,
        content: row.get(5)?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
        salience: row.get(7)?,
        confidence: row.get(8)?,
        created_at: row.get(9)?,
        accessed_at: row.get(10)?,
        access_count: row.get::<_, i64>(11)? as u64,
        immortal: row.get::<_, i64>(12)? != 0,
        provenance: row.get(13)?,
    })
}

fn insert_event(conn: &Connection, event: &Event) -> CortexResult<()> {
    conn.execute(
        "INSERT INTO events (
            id, session_id, project, git_branch, type, content, metadata,
            salience, confidence, created_at, accessed_at, access_count,
            immortal, provenance
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            event.id,
            event.session_id,
            event.project,
            event.git_branch,
            event.event_type.as_str(),
            event.content,
            serde_json::to_string(&event.metadata)?,
            event.salience,
            event.confidence,
            event.created_at,
            event.accessed_at,
            event.access_count as i64,
            event.immortal as i64,
            event.provenance,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

impl EventStorage for SqliteEventStore {
    fn append(&self, event: Event) -> CortexResult<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("append begin: {e}")))?;
        insert_event(&tx, &event)?;
        snapshot::invalidate_snapshots(&tx, Some(&event.git_branch))?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("append commit: {e}")))?;
        Ok(())
    }

    fn append_many(&self, events: Vec<Event>) -> CortexResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut hashes = self.load_content_hashes()?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("append_many begin: {e}")))?;

        let mut inserted = 0usize;
        let mut branches: HashSet<String> = HashSet::new();
        for event in events {
            if !hashes.insert(content_hash(&event)) {
                continue;
            }
            insert_event(&tx, &event)?;
            branches.insert(event.git_branch.clone());
            inserted += 1;
        }

        if inserted > 0 {
            // Same transaction as the inserts: readers never see new
            // events next to a stale cached briefing.
            for branch in &branches {
                snapshot::invalidate_snapshots(&tx, Some(branch))?;
            }
        }

        tx.commit()
            .map_err(|e| to_storage_err(format!("append_many commit: {e}")))?;
        Ok(inserted)
    }

    fn load_all(&self) -> CortexResult<Vec<Event>> {
        self.load_where("ORDER BY created_at, rowid", &[])
    }

    fn load_recent(&self, n: usize) -> CortexResult<Vec<Event>> {
        self.load_where(
            "ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            &[&(n as i64)],
        )
    }

    fn load_by_type(&self, event_type: EventType) -> CortexResult<Vec<Event>> {
        self.load_where(
            "WHERE type = ?1 ORDER BY created_at, rowid",
            &[&event_type.as_str()],
        )
    }

    fn load_immortal(&self) -> CortexResult<Vec<Event>> {
        self.load_where("WHERE immortal = 1 ORDER BY created_at, rowid", &[])
    }

    fn load_for_briefing(&self, branch: Option<&str>) -> CortexResult<BriefingEvents> {
        let all = self.load_all()?;
        Ok(select_for_briefing(all, branch, Utc::now()))
    }

    fn mark_accessed(&self, event_ids: &[String]) -> CortexResult<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let now = now_iso();
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("mark_accessed begin: {e}")))?;
        for id in event_ids {
            tx.execute(
                "UPDATE events
                 SET accessed_at = ?1, access_count = access_count + 1
                 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| to_storage_err(format!("mark_accessed commit: {e}")))?;
        Ok(())
    }

    fn clear(&self) -> CortexResult<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("clear begin: {e}")))?;
        tx.execute("DELETE FROM events", [])
            .map_err(|e| to_storage_err(e.to_string()))?;
        snapshot::invalidate_snapshots(&tx, None)?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("clear commit: {e}")))?;
        Ok(())
    }

    fn count(&self) -> CortexResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(|e| to_storage_err(e.to_string()))?;
        Ok(n as usize)
    }

    fn as_sqlite(&self) -> Option<&SqliteEventStore> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SqliteEventStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::open_at(&dir.path().join("events.db")).unwrap();
        (dir, store)
    }

    fn event(ty: EventType, content: &str) -> Event {
        Event::builder(ty, content)
            .session_id("s1")
            .git_branch("main")
            .build()
            .unwrap()
    }

    #[test]
    fn append_many_dedups_and_is_idempotent() {
        let (_dir, store) = store();
        let events = vec![
            event(EventType::DecisionMade, "Use SQLite"),
            event(EventType::DecisionMade, "Use SQLite"),
            event(EventType::CommandRun, "cargo build"),
        ];
        assert_eq!(store.append_many(events.clone()).unwrap(), 2);
        assert_eq!(store.append_many(events).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn append_invalidates_branch_and_global_snapshots() {
        let (_dir, store) = store();
        snapshot::save_snapshot(store.conn(), "main", "cached", &[], "", 1.0).unwrap();
        snapshot::save_snapshot(store.conn(), "", "global", &[], "", 1.0).unwrap();
        snapshot::save_snapshot(store.conn(), "other", "kept", &[], "", 1.0).unwrap();

        store
            .append_many(vec![event(EventType::CommandRun, "ls")])
            .unwrap();

        assert!(snapshot::get_valid_snapshot(store.conn(), "main").unwrap().is_none());
        assert!(snapshot::get_valid_snapshot(store.conn(), "").unwrap().is_none());
        assert!(snapshot::get_valid_snapshot(store.conn(), "other").unwrap().is_some());
    }

    #[test]
    fn duplicate_only_batch_leaves_snapshots_alone() {
        let (_dir, store) = store();
        let e = event(EventType::CommandRun, "ls");
        store.append_many(vec![e.clone()]).unwrap();
        snapshot::save_snapshot(store.conn(), "main", "cached", &[], "", 1.0).unwrap();

        assert_eq!(store.append_many(vec![e]).unwrap(), 0);
        assert!(snapshot::get_valid_snapshot(store.conn(), "main").unwrap().is_some());
    }

    #[test]
    fn load_by_type_and_immortal() {
        let (_dir, store) = store();
        store
            .append_many(vec![
                event(EventType::DecisionMade, "d"),
                event(EventType::ApproachRejected, "r"),
                event(EventType::CommandRun, "c"),
            ])
            .unwrap();

        assert_eq!(store.load_by_type(EventType::CommandRun).unwrap().len(), 1);
        let immortal = store.load_immortal().unwrap();
        assert_eq!(immortal.len(), 2);
        assert!(immortal.iter().all(|e| e.immortal));
    }

    #[test]
    fn mark_accessed_increments_and_advances() {
        let (_dir, store) = store();
        let e = event(EventType::KnowledgeAcquired, "fact");
        let id = e.id.clone();
        let before = e.accessed_at.clone();
        store.append_many(vec![e]).unwrap();

        store.mark_accessed(&[id.clone()]).unwrap();
        store.mark_accessed(&[id]).unwrap();

        let reloaded = &store.load_all().unwrap()[0];
        assert_eq!(reloaded.access_count, 2);
        assert!(reloaded.accessed_at >= before);
    }

    #[test]
    fn metadata_round_trips_through_sql() {
        let (_dir, store) = store();
        let e = Event::builder(EventType::CommandRun, "pytest -v")
            .session_id("s1")
            .metadata("description", serde_json::json!("run tests"))
            .build()
            .unwrap();
        store.append_many(vec![e]).unwrap();

        let reloaded = &store.load_all().unwrap()[0];
        assert_eq!(reloaded.metadata["description"], "run tests");
    }

    #[test]
    fn clear_removes_events_and_snapshots() {
        let (_dir, store) = store();
        store.append_many(vec![event(EventType::CommandRun, "ls")]).unwrap();
        snapshot::save_snapshot(store.conn(), "main", "cached", &[], "", 1.0).unwrap();

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(snapshot::get_valid_snapshot(store.conn(), "main").unwrap().is_none());
    }

    #[test]
    fn briefing_matches_shared_selection() {
        let (_dir, store) = store();
        store
            .append_many(vec![
                event(EventType::DecisionMade, "d1"),
                event(EventType::PlanCreated, "plan"),
                event(EventType::PlanStepCompleted, "step"),
                event(EventType::FileExplored, "/src/lib.rs"),
            ])
            .unwrap();

        let briefing = store.load_for_briefing(Some("main")).unwrap();
        assert_eq!(briefing.immortal.len(), 1);
        assert_eq!(briefing.active_plan.len(), 2);
        assert_eq!(briefing.recent.len(), 1);
    }
}
