//! In-process document store.
//!
//! Used when no database is configured and as the store behind the pipeline
//! tests. Enforces the same unique-fingerprint rule as the PostgreSQL schema.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use intake_core::{
    DocumentStore, DocumentSummary, Entity, Error, NewChunk, NewDocument, Result,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    summary: DocumentSummary,
    text: String,
    chunks: Vec<NewChunk>,
    entities: Vec<Entity>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, StoredDocument>,
    by_fingerprint: HashMap<String, Uuid>,
}

/// Document store held entirely in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    /// Stored text of a document.
    pub async fn text_for(&self, document_id: Uuid) -> Option<String> {
        self.inner
            .read()
            .await
            .documents
            .get(&document_id)
            .map(|doc| doc.text.clone())
    }

    /// Chunks stored for a document, in insertion order.
    pub async fn chunks_for(&self, document_id: Uuid) -> Vec<NewChunk> {
        self.inner
            .read()
            .await
            .documents
            .get(&document_id)
            .map(|doc| doc.chunks.clone())
            .unwrap_or_default()
    }

    /// Entities stored for a document, in insertion order.
    pub async fn entities_for(&self, document_id: Uuid) -> Vec<Entity> {
        self.inner
            .read()
            .await
            .documents
            .get(&document_id)
            .map(|doc| doc.entities.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DocumentSummary>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| inner.documents.get(id))
            .map(|doc| doc.summary.clone()))
    }

    async fn insert_document(&self, doc: NewDocument) -> Result<Uuid> {
        let mut inner = self.inner.write().await;
        if inner.by_fingerprint.contains_key(&doc.fingerprint) {
            return Err(Error::DuplicateFingerprint(doc.fingerprint));
        }

        let id = Uuid::now_v7();
        let summary = DocumentSummary {
            id,
            fingerprint: doc.fingerprint.clone(),
            filename: doc.filename.clone(),
            mime_type: doc.mime_type.clone(),
            file_size: doc.file_size,
            char_count: doc.char_count(),
            created_at: Utc::now(),
        };

        inner.by_fingerprint.insert(doc.fingerprint, id);
        inner.documents.insert(
            id,
            StoredDocument {
                summary,
                text: doc.text,
                chunks: Vec::new(),
                entities: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::Store(format!("Unknown document: {}", document_id)))?;
        let count = chunks.len();
        doc.chunks.extend(chunks);
        Ok(count)
    }

    async fn insert_entities(&self, document_id: Uuid, entities: Vec<Entity>) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::Store(format!("Unknown document: {}", document_id)))?;
        let count = entities.len();
        doc.entities.extend(entities);
        Ok(count)
    }
}
