//! Collaborator traits consumed by the ingestion pipeline.
//!
//! These traits define the narrow contracts of the hosted services the
//! pipeline orchestrates, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DocumentSummary, Entity, NewChunk, NewDocument, Vector};

// =============================================================================
// EXTRACTION TRAITS
// =============================================================================

/// Service turning raw document bytes into plain text.
///
/// Implementations may apply a fallback recognition pass (OCR) on input
/// without a usable text layer.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from raw bytes, using the MIME hint to pick a strategy.
    async fn extract_text(&self, data: &[u8], filename: &str, mime_hint: &str) -> Result<String>;

    /// Human-readable name of this extractor.
    fn name(&self) -> &str;
}

/// Service finding named entities in document text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Persistent store for processed documents.
///
/// Writes are independent: there is no transaction spanning
/// `insert_document`, `insert_chunks` and `insert_entities`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up a stored document by content fingerprint.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DocumentSummary>>;

    /// Insert a document record.
    ///
    /// Returns `Error::DuplicateFingerprint` if a document with the same
    /// fingerprint already exists.
    async fn insert_document(&self, doc: NewDocument) -> Result<Uuid>;

    /// Insert the embedded chunks of a document.
    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<usize>;

    /// Insert the entity metadata of a document.
    async fn insert_entities(&self, document_id: Uuid, entities: Vec<Entity>) -> Result<usize>;
}
