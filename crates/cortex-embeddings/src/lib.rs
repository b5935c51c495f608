//! # cortex-embeddings
//!
//! The pluggable text-to-vector interface used by tier 2 retrieval. The
//! neural model itself lives outside this workspace; callers hand the
//! engine any [`EmbeddingProvider`] implementation. The built-in
//! term-hashing provider keeps hybrid search functional (and the tests
//! deterministic) without a model download.

mod engine;
mod provider;
mod term_hash;

pub use engine::EmbeddingEngine;
pub use provider::{DisabledProvider, EmbeddingProvider};
pub use term_hash::TermHashProvider;
