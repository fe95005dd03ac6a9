//! # intake-inference
//!
//! Inference collaborators for the intake ingestion pipeline.
//!
//! - [`OllamaEmbedder`]: chunk embeddings via Ollama's `/api/embed`
//! - [`OllamaEntityExtractor`]: named entities via a JSON-mode chat model
//! - `mock` (feature): deterministic backends for tests and offline runs

pub mod entities;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use intake_core::{EmbeddingBackend, EntityExtractor, Error, Result};

pub use entities::{entity_prompt, parse_entity_response, truncate_chars};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaEmbedder, OllamaEntityExtractor};

#[cfg(feature = "mock")]
pub use mock::{MockEmbeddingBackend, MockEntityExtractor};
