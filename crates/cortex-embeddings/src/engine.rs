//! EmbeddingEngine — availability-aware wrapper over a provider.
//!
//! Degrades to `None` on any failure so callers can fall back to
//! keyword-only retrieval instead of propagating errors into hooks.

use tracing::{debug, warn};

use crate::provider::EmbeddingProvider;
use crate::term_hash::TermHashProvider;

/// Environment variable that overrides the embedding backend device.
pub const DEVICE_ENV_VAR: &str = "CORTEX_EMBEDDING_DEVICE";

/// The embedding entry point used by retrieval and migration.
pub struct EmbeddingEngine {
    provider: Box<dyn EmbeddingProvider>,
    device: String,
}

impl EmbeddingEngine {
    /// Engine with the default provider.
    pub fn new() -> Self {
        Self::with_provider(Box::new(TermHashProvider::default()))
    }

    /// Engine wrapping an explicit provider (a neural backend, a test
    /// double, or [`crate::DisabledProvider`]).
    pub fn with_provider(provider: Box<dyn EmbeddingProvider>) -> Self {
        let device = std::env::var(DEVICE_ENV_VAR).unwrap_or_else(|_| "cpu".to_string());
        debug!(provider = provider.name(), %device, "embedding engine ready");
        Self { provider, device }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Embed one text. `None` for empty input, an unavailable provider,
    /// or a provider failure.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if !self.provider.is_available() || text.trim().is_empty() {
            return None;
        }
        match self.provider.embed(text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "embedding generation failed");
                None
            }
        }
    }

    /// Embed a batch, preserving positions: empty or failed texts come
    /// back as `None`.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if !self.provider.is_available() {
            return vec![None; texts.len()];
        }
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl Default for EmbeddingEngine {
    fn default() -> Self {
        Self::new()
    }
}
