//! # cortex-transcript
//!
//! Incremental parsing of the host's append-only line-delimited transcript,
//! plus the three-layer extraction pipeline that turns transcript entries
//! into typed events.

pub mod discovery;
pub mod entry;
pub mod extract;
pub mod reader;

pub use entry::{strip_code_blocks, ContentBlock, Role, TranscriptEntry};
pub use extract::{extract_events, ExtractionContext};
pub use reader::TranscriptReader;
