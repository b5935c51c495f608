//! Hook payloads, read as JSON from standard input.
//!
//! Every field defaults: a missing field, an empty stdin, or malformed
//! JSON must never crash a hook — handlers see default values and bail
//! out with exit code 0.

use std::io::Read;

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Stop (session end) payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StopPayload {
    pub cwd: String,
    pub transcript_path: String,
    pub session_id: String,
    /// Recursion guard: true when the host re-enters the hook from a
    /// stop-hook continuation.
    pub stop_hook_active: bool,
}

/// PreCompact and SessionStart payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CwdPayload {
    pub cwd: String,
}

/// UserPromptSubmit payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptPayload {
    pub cwd: String,
    pub prompt: String,
}

/// Read a payload from stdin; defaults on any failure.
pub fn read_payload<T: DeserializeOwned + Default>() -> T {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() || raw.trim().is_empty() {
        return T::default();
    }
    serde_json::from_str(&raw).unwrap_or_default()
}
