//! Deterministic in-process collaborators for testing and offline runs.
//!
//! ## Usage
//!
//! ```rust
//! use intake_inference::mock::MockEmbeddingBackend;
//! use intake_core::EmbeddingBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let backend = MockEmbeddingBackend::new().with_dimension(8);
//! let vectors = backend.embed_texts(&["hello".to_string()]).await.unwrap();
//! assert_eq!(vectors[0].as_slice().len(), 8);
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use intake_core::{EmbeddingBackend, Entity, EntityExtractor, Error, Result, Vector};

/// Embedding backend producing stable pseudo-vectors derived from the text.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    latency: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self {
            dimension: 384,
            latency: Duration::ZERO,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Simulated latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call fail with an embedding error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of `embed_texts` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vector {
        // FNV-1a seed, then a xorshift stream.
        let mut state = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3));
        let values = (0..self.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state % 2000) as f32 / 1000.0) - 1.0
            })
            .collect::<Vec<f32>>();
        Vector::from(values)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(Error::Embedding("mock embedding failure".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// Entity extractor returning a fixed list, or failing on demand.
#[derive(Clone, Default)]
pub struct MockEntityExtractor {
    entities: Vec<Entity>,
    fail: bool,
}

impl MockEntityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    /// Make every call fail with an inference error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl EntityExtractor for MockEntityExtractor {
    async fn extract_entities(&self, _text: &str) -> Result<Vec<Entity>> {
        if self.fail {
            return Err(Error::Inference("mock entity extraction failure".to_string()));
        }
        Ok(self.entities.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vectors_are_deterministic_and_sized() {
        let backend = MockEmbeddingBackend::new().with_dimension(16);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = backend.embed_texts(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0].as_slice().len(), 16);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        assert!(vectors[0].as_slice().iter().all(|v| (-1.0..1.0).contains(v)));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_backends() {
        let embedder = MockEmbeddingBackend::new().failing();
        assert!(embedder.embed_texts(&["x".to_string()]).await.is_err());

        let extractor = MockEntityExtractor::new().failing();
        assert!(extractor.extract_entities("x").await.is_err());
    }

    #[tokio::test]
    async fn test_fixed_entities() {
        let extractor = MockEntityExtractor::new().with_entities(vec![Entity::new("Jane", "person")]);
        let entities = extractor.extract_entities("anything").await.unwrap();
        assert_eq!(entities[0].name, "Jane");
    }
}
