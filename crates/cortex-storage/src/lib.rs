//! # cortex-storage
//!
//! Tiered event persistence behind one [`EventStorage`] trait:
//! tier 0 is a JSON array on disk, tier 1+ an embedded SQLite database
//! with FTS5 and an embedding column. The briefing selection lives here as
//! a single free function so the tiers cannot drift apart.

pub mod db;
pub mod file_store;
pub mod hook_state;
pub mod snapshot;
pub mod sqlite_store;
pub mod vectors;

use chrono::{DateTime, Utc};

use cortex_core::config::CortexConfig;
use cortex_core::constants::RECENT_BRIEFING_LIMIT;
use cortex_core::errors::{CortexError, CortexResult, StorageError};
use cortex_core::event::{Event, EventType};
use cortex_core::salience::effective_salience;

pub use file_store::FileEventStore;
pub use hook_state::{HookState, HookStateFile};
pub use snapshot::Snapshot;
pub use sqlite_store::{load_event_by_id, parse_event_row, SqliteEventStore, EVENT_COLUMNS};

/// Wrap a low-level storage failure message.
pub(crate) fn to_storage_err(message: impl Into<String>) -> CortexError {
    StorageError::Sqlite {
        message: message.into(),
    }
    .into()
}

/// Events grouped for briefing composition. The three buckets are
/// disjoint; their union is a subset of the store contents.
#[derive(Debug, Clone, Default)]
pub struct BriefingEvents {
    /// Immortal events, newest first.
    pub immortal: Vec<Event>,
    /// Most recent plan plus its completed steps, chronological.
    pub active_plan: Vec<Event>,
    /// Everything else, by effective salience, capped.
    pub recent: Vec<Event>,
}

/// The storage contract both tiers implement.
pub trait EventStorage {
    /// Append a single event unconditionally.
    fn append(&self, event: Event) -> CortexResult<()>;

    /// Append a batch, deduplicating by content hash against the current
    /// store contents and within the batch. Returns how many were
    /// actually inserted.
    fn append_many(&self, events: Vec<Event>) -> CortexResult<usize>;

    fn load_all(&self) -> CortexResult<Vec<Event>>;

    /// The n most recent events by created_at descending.
    fn load_recent(&self, n: usize) -> CortexResult<Vec<Event>>;

    fn load_by_type(&self, event_type: EventType) -> CortexResult<Vec<Event>>;

    fn load_immortal(&self) -> CortexResult<Vec<Event>>;

    /// Events grouped for briefing composition, optionally branch-scoped.
    fn load_for_briefing(&self, branch: Option<&str>) -> CortexResult<BriefingEvents>;

    /// Advance accessed_at and access_count for the given ids
    /// (reinforcement on retrieval).
    fn mark_accessed(&self, event_ids: &[String]) -> CortexResult<()>;

    fn clear(&self) -> CortexResult<()>;

    fn count(&self) -> CortexResult<usize>;

    /// Downcast hook for tier-1+ callers (snapshot cache, search) that
    /// need the underlying database.
    fn as_sqlite(&self) -> Option<&SqliteEventStore> {
        None
    }
}

/// Open the store matching the configured tier.
pub fn open_event_store(
    project_hash: &str,
    config: &CortexConfig,
) -> CortexResult<Box<dyn EventStorage>> {
    if config.storage_tier >= 1 {
        Ok(Box::new(SqliteEventStore::open(project_hash, config)?))
    } else {
        Ok(Box::new(FileEventStore::new(project_hash, config)?))
    }
}

/// Group events for a briefing. Both storage tiers delegate here.
///
/// Branch filtering keeps events whose branch equals the filter or is
/// empty (branchless events belong everywhere). Buckets:
/// 1. `immortal` — newest first.
/// 2. `active_plan` — the latest plan_created plus every
///    plan_step_completed at or after it, chronological.
/// 3. `recent` — the rest, by effective salience at `now`, top 30.
pub fn select_for_briefing(
    all_events: Vec<Event>,
    branch: Option<&str>,
    now: DateTime<Utc>,
) -> BriefingEvents {
    let events: Vec<Event> = match branch {
        Some(b) if !b.is_empty() => all_events
            .into_iter()
            .filter(|e| e.git_branch == b || e.git_branch.is_empty())
            .collect(),
        _ => all_events,
    };

    let mut immortal: Vec<Event> = events.iter().filter(|e| e.immortal).cloned().collect();
    immortal.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let latest_plan = events
        .iter()
        .filter(|e| e.event_type == EventType::PlanCreated)
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
        .cloned();

    let mut active_plan = Vec::new();
    if let Some(plan) = latest_plan {
        let mut steps: Vec<Event> = events
            .iter()
            .filter(|e| {
                e.event_type == EventType::PlanStepCompleted && e.created_at >= plan.created_at
            })
            .cloned()
            .collect();
        steps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active_plan.push(plan);
        active_plan.extend(steps);
    }

    let included: std::collections::HashSet<&str> = immortal
        .iter()
        .chain(active_plan.iter())
        .map(|e| e.id.as_str())
        .collect();
    let mut recent: Vec<Event> = events
        .iter()
        .filter(|e| !included.contains(e.id.as_str()))
        .cloned()
        .collect();
    recent.sort_by(|a, b| {
        effective_salience(b, now)
            .partial_cmp(&effective_salience(a, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    recent.truncate(RECENT_BRIEFING_LIMIT);

    BriefingEvents {
        immortal,
        active_plan,
        recent,
    }
}
