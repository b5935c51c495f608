//! Per-project hook execution state, persisted in `state.json`.
//!
//! Makes transcript extraction resumable: the Stop hook records where it
//! left off and the next invocation reads only what was appended since.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cortex_core::config::{project_dir, CortexConfig};
use cortex_core::errors::CortexResult;
use cortex_core::fsio::write_atomic;

/// State carried between hook invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookState {
    /// Byte offset just past the last complete transcript line consumed.
    pub last_transcript_position: u64,
    pub last_transcript_path: String,
    pub last_session_id: String,
    pub session_count: u64,
    /// ISO timestamp of the last extraction, empty if never run.
    pub last_extraction_time: String,
}

/// `state.json` accessor for one project.
pub struct HookStateFile {
    path: PathBuf,
}

impl HookStateFile {
    pub fn new(project_hash: &str, config: &CortexConfig) -> CortexResult<Self> {
        let dir = project_dir(project_hash, config)?;
        Ok(Self {
            path: dir.join("state.json"),
        })
    }

    pub fn at_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, defaulting every field when the file is missing or
    /// unreadable.
    pub fn load(&self) -> HookState {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, state: &HookState) -> CortexResult<()> {
        let contents = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, &contents)
    }
}
