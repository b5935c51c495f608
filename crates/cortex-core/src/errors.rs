//! Error types for every Cortex layer.
//!
//! Each layer has its own `thiserror` enum; `CortexError` aggregates them
//! with `#[from]` conversions so `?` flows through the whole stack.

/// Event-model errors.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
}

/// Storage-layer errors for both the file and SQLite tiers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {message}")]
    Sqlite { message: String },

    #[error("event store corrupt at {path}: {details}")]
    Corrupt { path: String, details: String },

    #[error("write failed for {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Transcript reader errors.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("transcript not found: {path}")]
    Missing { path: String },

    #[error("transcript read failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Search-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search query failed: {message}")]
    Query { message: String },
}

/// Embedding-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("embedding generation failed: {message}")]
    Failed { message: String },
}

/// Migration errors. Migrations report failure through `MigrationResult`;
/// this type covers the irrecoverable cases (missing backup, bad paths).
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration failed: {reason}")]
    Failed { reason: String },
}

/// Hook dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("invalid hook payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Top-level error type aggregating every layer.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across the workspace.
pub type CortexResult<T> = Result<T, CortexError>;
