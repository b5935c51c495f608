//! Tier-0 event store: a JSON array in `events.json`.
//!
//! The whole file is read on every operation and rewritten atomically on
//! every mutation. Acceptable while event counts stay in the hundreds;
//! past that, `cortex upgrade` moves the project to SQLite.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use cortex_core::config::{project_dir, CortexConfig};
use cortex_core::errors::CortexResult;
use cortex_core::event::{content_hash, Event, EventType};
use cortex_core::fsio::write_atomic;
use cortex_core::time::now_iso;

use crate::{select_for_briefing, BriefingEvents, EventStorage};

pub struct FileEventStore {
    events_path: PathBuf,
}

impl FileEventStore {
    pub fn new(project_hash: &str, config: &CortexConfig) -> CortexResult<Self> {
        let dir = project_dir(project_hash, config)?;
        Ok(Self {
            events_path: dir.join("events.json"),
        })
    }

    /// Store rooted at an explicit directory (tests, migration).
    pub fn at_dir(dir: &Path) -> Self {
        Self {
            events_path: dir.join("events.json"),
        }
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Load the raw array. Missing, empty, or corrupt files read as empty:
    /// a broken store must degrade, not panic a hook.
    fn load_raw(&self) -> Vec<Event> {
        let Ok(raw) = fs::read_to_string(&self.events_path) else {
            return Vec::new();
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<Event>>(&raw) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    path = %self.events_path.display(),
                    error = %e,
                    "corrupt events.json, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn save_raw(&self, events: &[Event]) -> CortexResult<()> {
        let contents = serde_json::to_string_pretty(events)?;
        write_atomic(&self.events_path, &contents)
    }
}

impl EventStorage for FileEventStore {
    fn append(&self, event: Event) -> CortexResult<()> {
        let mut events = self.load_raw();
        events.push(event);
        self.save_raw(&events)
    }

    fn append_many(&self, events: Vec<Event>) -> CortexResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut existing = self.load_raw();
        let mut hashes: HashSet<String> = existing.iter().map(content_hash).collect();

        let mut inserted = 0;
        for event in events {
            if hashes.insert(content_hash(&event)) {
                existing.push(event);
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.save_raw(&existing)?;
        }
        Ok(inserted)
    }

    fn load_all(&self) -> CortexResult<Vec<Event>> {
        Ok(self.load_raw())
    }

    fn load_recent(&self, n: usize) -> CortexResult<Vec<Event>> {
        let mut events = self.load_raw();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(n);
        Ok(events)
    }

    fn load_by_type(&self, event_type: EventType) -> CortexResult<Vec<Event>> {
        Ok(self
            .load_raw()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect())
    }

    fn load_immortal(&self) -> CortexResult<Vec<Event>> {
        Ok(self.load_raw().into_iter().filter(|e| e.immortal).collect())
    }

    fn load_for_briefing(&self, branch: Option<&str>) -> CortexResult<BriefingEvents> {
        Ok(select_for_briefing(self.load_raw(), branch, Utc::now()))
    }

    fn mark_accessed(&self, event_ids: &[String]) -> CortexResult<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let ids: HashSet<&str> = event_ids.iter().map(String::as_str).collect();
        let now = now_iso();
        let mut events = self.load_raw();
        let mut modified = false;
        for event in &mut events {
            if ids.contains(event.id.as_str()) {
                event.accessed_at = now.clone();
                event.access_count += 1;
                modified = true;
            }
        }
        if modified {
            self.save_raw(&events)?;
        }
        Ok(())
    }

    fn clear(&self) -> CortexResult<()> {
        self.save_raw(&[])
    }

    fn count(&self) -> CortexResult<usize> {
        Ok(self.load_raw().len())
    }
}
