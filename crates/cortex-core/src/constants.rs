/// Cortex system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Decay rate applied per hour to the salience of non-immortal events.
/// 0.995/hour leaves a salience-0.7 event at ~0.55 after 48 hours and
/// ~0.30 after 7 days.
pub const DEFAULT_DECAY_RATE: f64 = 0.995;

/// Multiplier applied to salience when an event is accessed, capped at 1.0.
pub const DEFAULT_REINFORCEMENT_MULTIPLIER: f64 = 1.2;

/// Approximate characters per token for briefing budget enforcement.
pub const CHARS_PER_TOKEN: usize = 4;

/// Number of events kept in the briefing "recent" bucket.
pub const RECENT_BRIEFING_LIMIT: usize = 30;

/// Truncated hex length for the project hash and the event content hash.
pub const SHORT_HASH_LEN: usize = 16;

/// Dimensionality of stored embedding vectors.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Deadline for git subprocess calls. Past this the child is killed and
/// callers get the `unknown` fallback.
pub const GIT_TIMEOUT_SECS: u64 = 5;
