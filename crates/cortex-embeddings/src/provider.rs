use cortex_core::errors::{CortexResult, EmbeddingError};

/// A text-to-vector function of fixed dimension.
///
/// Implementations must produce L2-normalised vectors so cosine and L2
/// similarity agree downstream.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> CortexResult<Vec<f32>>;

    /// Embed a batch of texts, one vector per input.
    fn embed_batch(&self, texts: &[String]) -> CortexResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimensionality of vectors produced by this provider.
    fn dimensions(&self) -> usize;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether this provider can currently produce embeddings.
    fn is_available(&self) -> bool;
}

/// A provider that is never available. Stands in when embeddings are
/// disabled so the retrieval layer exercises its keyword-only degradation.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn embed(&self, _text: &str) -> CortexResult<Vec<f32>> {
        Err(EmbeddingError::Unavailable {
            reason: "embeddings disabled".to_string(),
        }
        .into())
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }
}
