//! # cortex-core
//!
//! Foundation crate for the Cortex memory engine.
//! Defines the event model, salience arithmetic, configuration, project
//! identity, errors, and constants. Every other crate in the workspace
//! depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod fsio;
pub mod project;
pub mod salience;
pub mod time;

// Re-export the most commonly used types at the crate root.
pub use config::CortexConfig;
pub use errors::{CortexError, CortexResult};
pub use event::{content_hash, Event, EventType};
pub use project::ProjectIdentity;
