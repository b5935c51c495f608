//! The four hook handlers.
//!
//! Each `handle_*` function is an exception firewall: it loads the global
//! config, runs the corresponding `run_*` body, and maps any error to one
//! stderr line plus exit code 0. The host must never be blocked by
//! Cortex. The `run_*` bodies take an explicit config so tests (and
//! embedded callers) can point them at a scratch home.

use std::path::{Path, PathBuf};

use cortex_core::config::{load_config, CortexConfig};
use cortex_core::errors::CortexResult;
use cortex_core::project::{identify_project, ProjectIdentity};
use cortex_core::time::now_iso;
use cortex_embeddings::EmbeddingEngine;
use cortex_retrieval::{write_briefing_to_file, write_relevant_context_to_file};
use cortex_storage::{open_event_store, EventStorage, HookStateFile};
use cortex_transcript::discovery::{find_latest_transcript, transcript_dir_for};
use cortex_transcript::{extract_events, ExtractionContext, TranscriptReader};
use tracing::debug;

use crate::payload::{CwdPayload, PromptPayload, StopPayload};
use crate::projections;

fn firewall(hook: &str, result: CortexResult<()>) -> i32 {
    if let Err(e) = result {
        eprintln!("[Cortex] {hook} error: {e}");
    }
    0
}

/// Session-end hook: incremental transcript extraction into the store.
pub fn handle_stop(payload: &StopPayload, regenerate_projections: bool) -> i32 {
    if payload.stop_hook_active {
        return 0;
    }
    firewall(
        "Stop",
        run_stop(payload, &load_config(None), regenerate_projections),
    )
}

/// Pre-compaction hook: extract what the Stop hook has not seen yet, then
/// refresh the briefing so compaction never erases context.
pub fn handle_precompact(payload: &CwdPayload) -> i32 {
    firewall("PreCompact", run_precompact(payload, &load_config(None)))
}

/// Session-start hook: write the briefing file.
pub fn handle_session_start(payload: &CwdPayload) -> i32 {
    firewall("SessionStart", run_session_start(payload, &load_config(None)))
}

/// Per-prompt hook (tier 2+): write the anticipatory context capsule.
pub fn handle_user_prompt_submit(payload: &PromptPayload) -> i32 {
    firewall(
        "UserPromptSubmit",
        run_user_prompt_submit(payload, &load_config(None)),
    )
}

pub fn run_stop(
    payload: &StopPayload,
    config: &CortexConfig,
    regenerate_projections: bool,
) -> CortexResult<()> {
    if payload.stop_hook_active || payload.cwd.is_empty() || payload.transcript_path.is_empty() {
        return Ok(());
    }
    let identity = identify_project(Path::new(&payload.cwd));
    let transcript_path = PathBuf::from(&payload.transcript_path);
    if !transcript_path.exists() {
        return Ok(());
    }

    let store = open_event_store(&identity.hash, config)?;
    let state_file = HookStateFile::new(&identity.hash, config)?;
    let mut state = state_file.load();

    let from_offset = if payload.transcript_path == state.last_transcript_path {
        state.last_transcript_position
    } else {
        0
    };

    let mut reader = TranscriptReader::new(&transcript_path);
    let entries = reader.read_new(from_offset)?;
    if !entries.is_empty() {
        let events = extract_events(
            &entries,
            &ExtractionContext {
                session_id: payload.session_id.clone(),
                project: identity.path.display().to_string(),
                git_branch: identity.git_branch.clone(),
            },
        );
        if !events.is_empty() {
            let inserted = store.append_many(events)?;
            debug!(inserted, "stop hook stored events");
            auto_embed(store.as_ref(), config, inserted);
        }
        state.session_count += 1;
    }

    state.last_transcript_position = reader.last_offset();
    state.last_transcript_path = payload.transcript_path.clone();
    state.last_session_id = payload.session_id.clone();
    state.last_extraction_time = now_iso();
    state_file.save(&state)?;

    if regenerate_projections && (config.storage_tier >= 3 || config.projections_enabled) {
        let branch = branch_filter(&identity);
        projections::regenerate_all(
            store.as_ref(),
            Path::new(&payload.cwd),
            branch.as_deref(),
            config,
        )?;
    }
    Ok(())
}

pub fn run_precompact(payload: &CwdPayload, config: &CortexConfig) -> CortexResult<()> {
    if payload.cwd.is_empty() {
        return Ok(());
    }
    let cwd = Path::new(&payload.cwd);
    let identity = identify_project(cwd);
    let store = open_event_store(&identity.hash, config)?;

    // PreCompact gets no transcript path; discover the newest one.
    let transcript = transcript_dir_for(&identity.path)
        .as_deref()
        .and_then(find_latest_transcript);
    if let Some(transcript_path) = transcript {
        let state_file = HookStateFile::new(&identity.hash, config)?;
        let mut state = state_file.load();
        let path_str = transcript_path.display().to_string();
        let from_offset = if path_str == state.last_transcript_path {
            state.last_transcript_position
        } else {
            0
        };

        let mut reader = TranscriptReader::new(&transcript_path);
        let entries = reader.read_new(from_offset)?;
        if !entries.is_empty() {
            let events = extract_events(
                &entries,
                &ExtractionContext {
                    // The payload carries no session id mid-session;
                    // reuse the last one the Stop hook recorded.
                    session_id: state.last_session_id.clone(),
                    project: identity.path.display().to_string(),
                    git_branch: identity.git_branch.clone(),
                },
            );
            if !events.is_empty() {
                let inserted = store.append_many(events)?;
                auto_embed(store.as_ref(), config, inserted);
            }
        }
        state.last_transcript_position = reader.last_offset();
        state.last_transcript_path = path_str;
        state.last_extraction_time = now_iso();
        state_file.save(&state)?;
    }

    // Always refresh the briefing, found transcript or not.
    let branch = branch_filter(&identity);
    write_briefing_to_file(
        &rules_file(cwd, "cortex-briefing.md"),
        store.as_ref(),
        config,
        branch.as_deref(),
        true,
    )
}

pub fn run_session_start(payload: &CwdPayload, config: &CortexConfig) -> CortexResult<()> {
    if payload.cwd.is_empty() {
        return Ok(());
    }
    let cwd = Path::new(&payload.cwd);
    let identity = identify_project(cwd);
    let store = open_event_store(&identity.hash, config)?;
    let branch = branch_filter(&identity);
    write_briefing_to_file(
        &rules_file(cwd, "cortex-briefing.md"),
        store.as_ref(),
        config,
        branch.as_deref(),
        true,
    )
}

pub fn run_user_prompt_submit(payload: &PromptPayload, config: &CortexConfig) -> CortexResult<()> {
    if payload.cwd.is_empty() || config.storage_tier < 2 {
        return Ok(());
    }
    let cwd = Path::new(&payload.cwd);
    let identity = identify_project(cwd);
    let store = open_event_store(&identity.hash, config)?;
    let engine = EmbeddingEngine::new();

    let branch = branch_filter(&identity);
    write_relevant_context_to_file(
        &rules_file(cwd, "cortex-relevant-context.md"),
        store.as_ref(),
        config,
        &engine,
        &payload.prompt,
        branch.as_deref(),
    )?;
    Ok(())
}

/// Tier 2 with auto_embed on: embed whatever lacks vectors, best-effort,
/// in the same hook invocation.
fn auto_embed(store: &dyn EventStorage, config: &CortexConfig, inserted: usize) {
    if inserted == 0 || config.storage_tier < 2 || !config.auto_embed {
        return;
    }
    let Some(sqlite) = store.as_sqlite() else { return };
    let engine = EmbeddingEngine::new();
    if let Err(e) = sqlite.backfill_embeddings(&engine, 32, None) {
        debug!(error = %e, "auto-embed failed, continuing without vectors");
    }
}

fn rules_file(cwd: &Path, name: &str) -> PathBuf {
    cwd.join(".claude").join("rules").join(name)
}

/// Branch used to scope briefings and retrieval; empty branches are
/// treated as no filter.
fn branch_filter(identity: &ProjectIdentity) -> Option<String> {
    if identity.git_branch.is_empty() {
        None
    } else {
        Some(identity.git_branch.clone())
    }
}
