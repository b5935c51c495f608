//! Term-hashing embedding provider.
//!
//! Produces fixed-dimension dense vectors by hashing tokens into buckets
//! and weighting by in-text frequency. Deterministic, dependency-free, and
//! always available; not as semantically rich as a neural model, but it
//! keeps hybrid retrieval working in air-gapped environments and gives the
//! test suite stable vectors.

use std::collections::HashMap;

use cortex_core::constants::EMBEDDING_DIMENSION;
use cortex_core::errors::CortexResult;

use crate::provider::EmbeddingProvider;

/// Deterministic bag-of-terms embedding provider.
pub struct TermHashProvider {
    dimensions: usize,
}

impl TermHashProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// FNV-1a bucket index for a term.
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        (h as usize) % dims
    }

    /// Sign for a term, from a second hash pass, so collisions partially
    /// cancel instead of compounding.
    fn sign(term: &str) -> f32 {
        let mut h: u64 = 0x8422_2325_cbf2_9ce4;
        for b in term.as_bytes() {
            h = h.wrapping_mul(0x0100_0000_01b3);
            h ^= u64::from(*b);
        }
        if h & 1 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(str::to_lowercase)
            .collect()
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vec;
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *counts.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in &counts {
            let freq = count / total;
            // Longer terms carry more signal than near-stopwords.
            let weight = freq * (1.0 + (term.len() as f32).ln());
            vec[Self::bucket(term, self.dimensions)] += Self::sign(term) * weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for TermHashProvider {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSION)
    }
}

impl EmbeddingProvider for TermHashProvider {
    fn embed(&self, text: &str) -> CortexResult<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "term-hash"
    }

    fn is_available(&self) -> bool {
        true
    }
}
