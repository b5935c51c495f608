//! Configuration management.
//!
//! All values have defaults, so Cortex starts with no config file at all.
//! Load is strictly lenient: a missing, empty, or corrupt config.json
//! yields the defaults. `cortex_home` is path-validated — anything that
//! does not resolve beneath `~/.cortex` is replaced with the default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::CortexResult;
use crate::fsio::write_atomic;

/// Process-wide configuration for the Cortex memory engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// Root directory for all Cortex data. Must resolve under `~/.cortex`.
    pub cortex_home: PathBuf,

    /// Storage mode: 0 file-only, 1 SQLite + FTS, 2 adds the vector
    /// column, 3 adds projections and the query server.
    pub storage_tier: u8,

    // Decay and salience parameters.
    pub decay_rate: f64,
    pub confidence_threshold: f64,
    pub reinforcement_multiplier: f64,

    // Briefing budget.
    pub max_briefing_tokens: usize,
    pub max_full_decisions: usize,
    pub max_summary_decisions: usize,

    // Decision tiering thresholds (immortal event growth management).
    pub decision_active_sessions: usize,
    pub decision_aging_sessions: usize,

    /// Snapshot cache TTL in hours.
    pub snapshot_ttl_hours: f64,

    /// Tier 2: embed newly appended events in the same hook invocation.
    pub auto_embed: bool,

    /// Tier 3 feature flags.
    pub mcp_enabled: bool,
    pub projections_enabled: bool,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            cortex_home: default_cortex_home(),
            storage_tier: 0,
            decay_rate: 0.995,
            confidence_threshold: 0.5,
            reinforcement_multiplier: 1.2,
            max_briefing_tokens: 3000,
            max_full_decisions: 50,
            max_summary_decisions: 30,
            decision_active_sessions: 20,
            decision_aging_sessions: 50,
            snapshot_ttl_hours: 1.0,
            auto_embed: false,
            mcp_enabled: false,
            projections_enabled: false,
        }
    }
}

/// The default Cortex home directory, `~/.cortex`.
pub fn default_cortex_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".cortex"))
        .unwrap_or_else(|| PathBuf::from(".cortex"))
}

/// Validate a configured `cortex_home`: it must sit beneath `~/.cortex`,
/// otherwise the default is used. Prevents a corrupt or hostile config
/// from pointing the engine at an arbitrary directory.
fn validate_cortex_home(candidate: &Path) -> PathBuf {
    let allowed_root = default_cortex_home();
    if candidate.as_os_str().is_empty() {
        return allowed_root;
    }
    if candidate.is_absolute() && candidate.starts_with(&allowed_root) {
        return candidate.to_path_buf();
    }
    allowed_root
}

/// Path to the global config file under a given home.
pub fn config_path(cortex_home: &Path) -> PathBuf {
    cortex_home.join("config.json")
}

/// Per-project data directory, `<home>/projects/<hash>/`, created on demand.
pub fn project_dir(project_hash: &str, config: &CortexConfig) -> CortexResult<PathBuf> {
    let dir = config.cortex_home.join("projects").join(project_hash);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Load configuration from `<home>/config.json`.
///
/// Returns defaults when the file is missing, unreadable, or not valid
/// JSON — Cortex must never fail to start over a bad config. Passing
/// `home_override` (used by tests and embedded callers) skips the
/// `~/.cortex` validation for the home itself.
pub fn load_config(home_override: Option<&Path>) -> CortexConfig {
    let home = home_override
        .map(Path::to_path_buf)
        .unwrap_or_else(default_cortex_home);
    let path = config_path(&home);

    let mut config = match fs::read_to_string(&path) {
        Ok(raw) if !raw.trim().is_empty() => match serde_json::from_str::<CortexConfig>(&raw) {
            Ok(mut parsed) => {
                parsed.cortex_home = validate_cortex_home(&parsed.cortex_home);
                parsed
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt config, using defaults");
                CortexConfig::default()
            }
        },
        _ => CortexConfig::default(),
    };

    if home_override.is_some() {
        config.cortex_home = home;
    }
    config
}

/// Save configuration atomically to `<home>/config.json`.
pub fn save_config(config: &CortexConfig) -> CortexResult<()> {
    let path = config_path(&config.cortex_home);
    let contents = serde_json::to_string_pretty(config)?;
    write_atomic(&path, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_cold_start() {
        let c = CortexConfig::default();
        assert_eq!(c.storage_tier, 0);
        assert!((c.decay_rate - 0.995).abs() < f64::EPSILON);
        assert_eq!(c.max_briefing_tokens, 3000);
        assert_eq!(c.max_full_decisions, 50);
        assert_eq!(c.max_summary_decisions, 30);
        assert!(!c.auto_embed);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = load_config(Some(dir.path()));
        assert_eq!(c.storage_tier, 0);
        assert_eq!(c.cortex_home, dir.path());
    }

    #[test]
    fn load_corrupt_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), "{not json").unwrap();
        let c = load_config(Some(dir.path()));
        assert_eq!(c.storage_tier, 0);
    }

    #[test]
    fn load_empty_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), "").unwrap();
        let c = load_config(Some(dir.path()));
        assert_eq!(c.max_briefing_tokens, 3000);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = load_config(Some(dir.path()));
        c.storage_tier = 2;
        c.auto_embed = true;
        c.snapshot_ttl_hours = 0.5;
        save_config(&c).unwrap();

        let loaded = load_config(Some(dir.path()));
        assert_eq!(loaded.storage_tier, 2);
        assert!(loaded.auto_embed);
        assert!((loaded.snapshot_ttl_hours - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), r#"{"storage_tier": 1}"#).unwrap();
        let c = load_config(Some(dir.path()));
        assert_eq!(c.storage_tier, 1);
        assert_eq!(c.max_full_decisions, 50);
        assert!((c.reinforcement_multiplier - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn foreign_cortex_home_is_rejected() {
        let rejected = validate_cortex_home(Path::new("/etc/passwd"));
        assert_eq!(rejected, default_cortex_home());
        let relative = validate_cortex_home(Path::new("relative/dir"));
        assert_eq!(relative, default_cortex_home());
    }

    #[test]
    fn project_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let c = load_config(Some(dir.path()));
        let p = project_dir("abcd1234abcd1234", &c).unwrap();
        assert!(p.is_dir());
        assert!(p.ends_with("projects/abcd1234abcd1234"));
    }
}
