//! # cortex-migration
//!
//! Tier detection and safe upgrades: 0 (JSON) → 1 (SQLite + FTS5) →
//! 2 (embeddings) → 3 (projections + query server). Upgrades back up
//! first, insert in batches, and report a typed [`MigrationResult`] —
//! unlike the hook path, migration never swallows failures, so the CLI
//! can print the error and offer rollback.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use cortex_core::config::{save_config, CortexConfig};
use cortex_core::errors::{CortexResult, MigrationError};
use cortex_embeddings::EmbeddingEngine;
use cortex_storage::{EventStorage, FileEventStore, HookState, HookStateFile, SqliteEventStore};
use tracing::info;

/// Events inserted per transaction during tier 0 → 1.
pub const BATCH_SIZE: usize = 1000;

/// Texts embedded per batch during tier 1 → 2.
pub const EMBEDDING_BATCH_SIZE: usize = 32;

/// Embedding coverage at which a database counts as tier 2.
pub const EMBEDDING_COVERAGE_THRESHOLD: f64 = 0.5;

/// Project directory without creating it — detection and dry runs must
/// not touch the filesystem.
fn project_dir_path(project_hash: &str, config: &CortexConfig) -> PathBuf {
    config.cortex_home.join("projects").join(project_hash)
}

/// Detect the storage tier from what is actually on disk.
///
/// -1: nothing; 0: `events.json` only; 1: `events.db` with embedding
/// coverage below 50% and config below tier 2; 2: `events.db` with
/// config tier >= 2 or coverage >= 50%.
pub fn detect_tier(project_hash: &str, config: &CortexConfig) -> i32 {
    let dir = project_dir_path(project_hash, config);
    let events_db = dir.join("events.db");
    let events_json = dir.join("events.json");

    if events_db.exists() {
        if config.storage_tier >= 2 {
            return 2;
        }
        if embedding_coverage(&events_db).unwrap_or(0.0) >= EMBEDDING_COVERAGE_THRESHOLD {
            return 2;
        }
        return 1;
    }
    if events_json.exists() {
        return 0;
    }
    -1
}

fn embedding_coverage(db_path: &Path) -> Option<f64> {
    let store = SqliteEventStore::open_at(db_path).ok()?;
    let total = store.count().ok()?;
    if total == 0 {
        return Some(0.0);
    }
    let embedded = store.count_embeddings().ok()?;
    Some(embedded as f64 / total as f64)
}

/// Pre-upgrade report for `cortex status` and `cortex upgrade`.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current_tier: i32,
    pub config_tier: u8,
    pub target_tier: i32,
    pub can_upgrade: bool,
    pub events_count: usize,
    pub embedding_count: usize,
    pub has_hook_state: bool,
    pub details: String,
}

pub fn migration_status(project_hash: &str, config: &CortexConfig) -> MigrationStatus {
    let dir = project_dir_path(project_hash, config);
    let current_tier = detect_tier(project_hash, config);

    let mut status = MigrationStatus {
        current_tier,
        config_tier: config.storage_tier,
        target_tier: current_tier + 1,
        can_upgrade: false,
        events_count: 0,
        embedding_count: 0,
        has_hook_state: dir.join("state.json").exists(),
        details: String::new(),
    };

    match current_tier {
        -1 => {
            status.details = "No storage found — project not initialized".to_string();
        }
        0 => {
            status.events_count = FileEventStore::at_dir(&dir).count().unwrap_or(0);
            if dir.join("events.db").exists() {
                status.details =
                    "Both JSON and SQLite exist — use --force to overwrite".to_string();
            } else {
                status.can_upgrade = true;
                status.details = format!("Ready to upgrade: {} events", status.events_count);
            }
        }
        1 | 2 => {
            if let Ok(store) = SqliteEventStore::open_at(&dir.join("events.db")) {
                status.events_count = store.count().unwrap_or(0);
                status.embedding_count = store.count_embeddings().unwrap_or(0);
            }
            if current_tier == 1 {
                status.can_upgrade = true;
                status.details = format!(
                    "Ready to upgrade: embed {} of {} events",
                    status.events_count - status.embedding_count.min(status.events_count),
                    status.events_count
                );
            } else {
                status.can_upgrade = !config.projections_enabled || !config.mcp_enabled;
                status.details = if status.can_upgrade {
                    "Ready to upgrade: enable projections and the query server".to_string()
                } else {
                    "Already on Tier 3 (MCP + Projections)".to_string()
                };
                if !status.can_upgrade {
                    status.target_tier = current_tier;
                }
            }
        }
        _ => unreachable!(),
    }
    status
}

/// Outcome of an upgrade step.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub success: bool,
    pub from_tier: i32,
    pub to_tier: i32,
    pub events_migrated: usize,
    pub hook_state_migrated: bool,
    pub embeddings_generated: usize,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
    pub dry_run: bool,
}

impl MigrationResult {
    fn failure(from_tier: i32, dry_run: bool, error: impl Into<String>) -> Self {
        Self {
            success: false,
            from_tier,
            to_tier: from_tier,
            events_migrated: 0,
            hook_state_migrated: false,
            embeddings_generated: 0,
            backup_path: None,
            error: Some(error.into()),
            dry_run,
        }
    }
}

/// Upgrade a project one tier, dispatching on the detected tier.
pub fn upgrade(
    project_hash: &str,
    config: &CortexConfig,
    engine: &EmbeddingEngine,
    dry_run: bool,
    force: bool,
    progress: Option<&mut dyn FnMut(usize, usize)>,
) -> MigrationResult {
    let status = migration_status(project_hash, config);

    if status.current_tier == -1 {
        return MigrationResult::failure(-1, dry_run, "No storage found — project not initialized");
    }
    if !status.can_upgrade && !force {
        return MigrationResult::failure(status.current_tier, dry_run, status.details);
    }

    match status.current_tier {
        0 => upgrade_tier0_to_tier1(project_hash, config, &status, dry_run, force),
        1 => upgrade_tier1_to_tier2(project_hash, config, engine, &status, dry_run, progress),
        2 => upgrade_tier2_to_tier3(project_hash, config, &status, dry_run),
        tier => MigrationResult::failure(tier, dry_run, "Already at the highest tier"),
    }
}

fn upgrade_tier0_to_tier1(
    project_hash: &str,
    config: &CortexConfig,
    status: &MigrationStatus,
    dry_run: bool,
    force: bool,
) -> MigrationResult {
    if dry_run {
        return MigrationResult {
            success: true,
            from_tier: 0,
            to_tier: 1,
            events_migrated: status.events_count,
            hook_state_migrated: status.has_hook_state,
            embeddings_generated: 0,
            backup_path: None,
            error: None,
            dry_run: true,
        };
    }

    let run = || -> CortexResult<MigrationResult> {
        let dir = project_dir_path(project_hash, config);

        let backup_path = create_backup(&dir)?;
        let events = FileEventStore::at_dir(&dir).load_all()?;
        let hook_state_file = HookStateFile::at_dir(&dir);
        let hook_state = hook_state_file
            .path()
            .exists()
            .then(|| hook_state_file.load());

        let db_file = dir.join("events.db");
        if force && db_file.exists() {
            fs::remove_file(&db_file)?;
        }

        let store = SqliteEventStore::open_at(&db_file)?;
        let mut migrated = 0usize;
        for batch in events.chunks(BATCH_SIZE) {
            migrated += store.append_many(batch.to_vec())?;
        }

        let hook_state_migrated = match hook_state {
            Some(state) => {
                write_hook_state_rows(&store, &state)?;
                true
            }
            None => false,
        };

        archive_tier0_files(&dir)?;

        // Persist the new tier so the store factory opens SQLite next time.
        let mut upgraded = config.clone();
        upgraded.storage_tier = 1;
        save_config(&upgraded)?;

        info!(project = project_hash, migrated, "tier 0 → 1 migration complete");
        Ok(MigrationResult {
            success: true,
            from_tier: 0,
            to_tier: 1,
            events_migrated: migrated,
            hook_state_migrated,
            embeddings_generated: 0,
            backup_path: Some(backup_path),
            error: None,
            dry_run: false,
        })
    };

    run().unwrap_or_else(|e| MigrationResult::failure(0, false, e.to_string()))
}

fn upgrade_tier1_to_tier2(
    project_hash: &str,
    config: &CortexConfig,
    engine: &EmbeddingEngine,
    status: &MigrationStatus,
    dry_run: bool,
    progress: Option<&mut dyn FnMut(usize, usize)>,
) -> MigrationResult {
    if !engine.is_available() {
        return MigrationResult::failure(1, dry_run, "Embedding engine unavailable");
    }
    if dry_run {
        return MigrationResult {
            success: true,
            from_tier: 1,
            to_tier: 2,
            events_migrated: 0,
            hook_state_migrated: false,
            embeddings_generated: status.events_count - status.embedding_count.min(status.events_count),
            backup_path: None,
            error: None,
            dry_run: true,
        };
    }

    let run = |progress| -> CortexResult<MigrationResult> {
        let dir = project_dir_path(project_hash, config);
        let store = SqliteEventStore::open_at(&dir.join("events.db"))?;
        let generated = store.backfill_embeddings(engine, EMBEDDING_BATCH_SIZE, progress)?;

        let mut upgraded = config.clone();
        upgraded.storage_tier = 2;
        upgraded.auto_embed = true;
        save_config(&upgraded)?;

        info!(project = project_hash, generated, "tier 1 → 2 migration complete");
        Ok(MigrationResult {
            success: true,
            from_tier: 1,
            to_tier: 2,
            events_migrated: 0,
            hook_state_migrated: false,
            embeddings_generated: generated,
            backup_path: None,
            error: None,
            dry_run: false,
        })
    };

    run(progress).unwrap_or_else(|e| MigrationResult::failure(1, false, e.to_string()))
}

fn upgrade_tier2_to_tier3(
    project_hash: &str,
    config: &CortexConfig,
    _status: &MigrationStatus,
    dry_run: bool,
) -> MigrationResult {
    if dry_run {
        return MigrationResult {
            success: true,
            from_tier: 2,
            to_tier: 3,
            events_migrated: 0,
            hook_state_migrated: false,
            embeddings_generated: 0,
            backup_path: None,
            error: None,
            dry_run: true,
        };
    }

    // Pure flag toggles, no data transformation.
    let mut upgraded = config.clone();
    upgraded.storage_tier = 3;
    upgraded.mcp_enabled = true;
    upgraded.projections_enabled = true;
    match save_config(&upgraded) {
        Ok(()) => {
            info!(project = project_hash, "tier 2 → 3 migration complete");
            MigrationResult {
                success: true,
                from_tier: 2,
                to_tier: 3,
                events_migrated: 0,
                hook_state_migrated: false,
                embeddings_generated: 0,
                backup_path: None,
                error: None,
                dry_run: false,
            }
        }
        Err(e) => MigrationResult::failure(2, false, e.to_string()),
    }
}

/// Copy the tier-0 files into `backups/tier0_<UTC timestamp>/`.
fn create_backup(project_dir: &Path) -> CortexResult<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup_dir = project_dir.join("backups").join(format!("tier0_{stamp}"));
    fs::create_dir_all(&backup_dir)?;

    for name in ["events.json", "state.json", "config.json"] {
        let source = project_dir.join(name);
        if source.exists() {
            fs::copy(&source, backup_dir.join(name))?;
        }
    }
    Ok(backup_dir)
}

/// Record hook state into the database's key/value table.
fn write_hook_state_rows(store: &SqliteEventStore, state: &HookState) -> CortexResult<()> {
    let value = serde_json::to_value(state)?;
    let Some(entries) = value.as_object() else {
        return Ok(());
    };
    for (key, val) in entries {
        store
            .conn()
            .execute(
                "INSERT OR REPLACE INTO hook_state (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, val.to_string()],
            )
            .map_err(|e| MigrationError::Failed {
                reason: format!("hook_state row: {e}"),
            })?;
    }
    Ok(())
}

/// Move the tier-0 JSON files aside — tier detection is file-presence
/// based, so they must leave the project root.
fn archive_tier0_files(project_dir: &Path) -> CortexResult<()> {
    let archive_dir = project_dir.join("archive");
    fs::create_dir_all(&archive_dir)?;
    for name in ["events.json", "state.json"] {
        let source = project_dir.join(name);
        if source.exists() {
            fs::rename(&source, archive_dir.join(name))?;
        }
    }
    Ok(())
}

/// Undo a failed tier 0 → 1 migration: remove the SQLite files and
/// restore the backed-up JSON.
pub fn rollback(project_hash: &str, backup_path: &Path, config: &CortexConfig) -> CortexResult<()> {
    if !backup_path.exists() {
        return Err(MigrationError::Failed {
            reason: format!("backup not found: {}", backup_path.display()),
        }
        .into());
    }

    let dir = project_dir_path(project_hash, config);
    for name in ["events.db", "events.db-wal", "events.db-shm"] {
        let path = dir.join(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    for name in ["events.json", "state.json", "config.json"] {
        let source = backup_path.join(name);
        if source.exists() {
            fs::copy(&source, dir.join(name))?;
        }
    }
    Ok(())
}
