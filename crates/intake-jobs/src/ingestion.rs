//! The `process_document` handler: dedup, extract, entity-extract, embed, persist.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use intake_core::defaults::{DEFAULT_MIME_TYPE, MAX_DOCUMENT_BYTES};
use intake_core::{
    content_fingerprint, DocumentStore, EmbeddingBackend, Entity, EntityExtractor, Error,
    NewChunk, NewDocument, PipelineStage, Result, TextExtractor,
};
use intake_db::{Chunker, ChunkerConfig, SlidingWindowChunker};

use crate::extraction::detect_mime;
use crate::handler::{JobContext, JobHandler};

/// Input payload of a `process_document` job.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestParams {
    /// Path of the file to ingest. Either this or `data` must be set.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Inline document content.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// The file at `file_path` is a temporary upload owned by the job.
    #[serde(default)]
    pub owned: bool,
}

impl IngestParams {
    pub fn from_json(params: &JsonValue) -> Result<Self> {
        let parsed: Self = serde_json::from_value(params.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid process_document params: {}", e)))?;
        if parsed.file_path.is_none() && parsed.data.is_none() {
            return Err(Error::InvalidInput(
                "No data provided (expected 'file_path' or 'data' field)".to_string(),
            ));
        }
        Ok(parsed)
    }

    /// Display name of the document.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Deletes an owned upload when dropped, whatever path the pipeline exits by.
struct OwnedUpload {
    path: Option<PathBuf>,
}

impl OwnedUpload {
    /// Read `owned` and `file_path` leniently from raw params, so the upload is
    /// cleaned up even when the rest of the payload fails to parse.
    fn from_raw(params: &JsonValue) -> Self {
        let owned = params.get("owned").and_then(JsonValue::as_bool) == Some(true);
        let path = params
            .get("file_path")
            .and_then(JsonValue::as_str)
            .filter(|p| owned && !p.is_empty())
            .map(PathBuf::from);
        Self { path }
    }
}

impl Drop for OwnedUpload {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed owned upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove owned upload"),
        }
    }
}

fn check_size(len: u64) -> Result<()> {
    if len > MAX_DOCUMENT_BYTES {
        return Err(Error::InvalidInput(format!(
            "Document is {} bytes, limit is {}",
            len, MAX_DOCUMENT_BYTES
        )));
    }
    Ok(())
}

/// Runs the document ingestion pipeline against its collaborators.
pub struct IngestionHandler {
    extractor: Arc<dyn TextExtractor>,
    entities: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn DocumentStore>,
    chunker: Box<dyn Chunker>,
}

impl IngestionHandler {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        entities: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            extractor,
            entities,
            embedder,
            store,
            chunker: Box::new(SlidingWindowChunker::default()),
        }
    }

    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.chunker = Box::new(SlidingWindowChunker::new(config));
        self
    }

    async fn load(&self, params: &IngestParams) -> Result<Vec<u8>> {
        let data = match (&params.file_path, &params.data) {
            (Some(path), _) => {
                check_size(tokio::fs::metadata(path).await?.len())?;
                tokio::fs::read(path).await?
            }
            (None, Some(data)) => data.as_bytes().to_vec(),
            (None, None) => {
                return Err(Error::InvalidInput("No document content".to_string()));
            }
        };
        // The file may have grown since the metadata check.
        check_size(data.len() as u64)?;
        Ok(data)
    }

    fn duplicate(fingerprint: &str, document_id: Option<Uuid>) -> JsonValue {
        json!({
            "status": "duplicate",
            "file_hash": fingerprint,
            "document_id": document_id,
            "message": "Document with identical content already exists",
        })
    }

    async fn embed_chunks(&self, text: &str) -> Result<Vec<NewChunk>> {
        let chunks = self.chunker.chunk(text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| NewChunk {
                chunk_index: chunk.index,
                token_count: chunk.token_estimate(),
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                text: chunk.text,
                embedding,
            })
            .collect())
    }

    async fn find_existing(&self, fingerprint: &str) -> Option<Uuid> {
        match self.store.find_by_fingerprint(fingerprint).await {
            Ok(existing) => existing.map(|doc| doc.id),
            Err(e) => {
                warn!(fingerprint, error = %e, "Duplicate lookup failed after insert conflict");
                None
            }
        }
    }

    async fn run(&self, ctx: &JobContext, params: &IngestParams) -> Result<JsonValue> {
        let filename = params.display_name();

        ctx.report_progress(
            PipelineStage::Fingerprint.checkpoint(),
            PipelineStage::Fingerprint.message(),
        );
        let data = self
            .load(params)
            .await
            .map_err(|e| Error::stage(PipelineStage::Fingerprint, e))?;
        let fingerprint = content_fingerprint(&data);

        let existing = self
            .store
            .find_by_fingerprint(&fingerprint)
            .await
            .map_err(|e| Error::stage(PipelineStage::Fingerprint, e))?;
        if let Some(doc) = existing {
            info!(
                job_id = %ctx.job_id,
                fingerprint = %fingerprint,
                document_id = %doc.id,
                "Duplicate document, skipping ingestion"
            );
            return Ok(Self::duplicate(&fingerprint, Some(doc.id)));
        }

        let hint = params.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        let mime_type = detect_mime(&filename, &data, hint);

        ctx.report_progress(
            PipelineStage::TextExtraction.checkpoint(),
            PipelineStage::TextExtraction.message(),
        );
        let text = self
            .extractor
            .extract_text(&data, &filename, &mime_type)
            .await
            .map_err(|e| Error::stage(PipelineStage::TextExtraction, e))?;
        if text.trim().is_empty() {
            return Err(Error::stage(
                PipelineStage::TextExtraction,
                Error::Extraction(format!("No text could be extracted from '{}'", filename)),
            ));
        }

        ctx.report_progress(
            PipelineStage::EntityExtraction.checkpoint(),
            PipelineStage::EntityExtraction.message(),
        );
        let entities: Vec<Entity> = match self.entities.extract_entities(&text).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(
                    job_id = %ctx.job_id,
                    stage = PipelineStage::EntityExtraction.as_str(),
                    error = %e,
                    "Entity extraction failed, continuing without entities"
                );
                Vec::new()
            }
        };

        ctx.report_progress(
            PipelineStage::Embedding.checkpoint(),
            PipelineStage::Embedding.message(),
        );
        let chunks = self
            .embed_chunks(&text)
            .await
            .map_err(|e| Error::stage(PipelineStage::Embedding, e))?;
        let chunk_count = chunks.len();
        let entity_count = entities.len();

        ctx.report_progress(
            PipelineStage::Persistence.checkpoint(),
            PipelineStage::Persistence.message(),
        );
        let text_length = text.chars().count();
        let document = NewDocument {
            fingerprint: fingerprint.clone(),
            filename: filename.clone(),
            mime_type,
            file_size: params.file_size.unwrap_or(data.len() as u64),
            text,
        };
        let document_id = match self.store.insert_document(document).await {
            Ok(id) => id,
            Err(Error::DuplicateFingerprint(_)) => {
                info!(
                    job_id = %ctx.job_id,
                    fingerprint = %fingerprint,
                    "Document stored concurrently, treating as duplicate"
                );
                let existing = self.find_existing(&fingerprint).await;
                return Ok(Self::duplicate(&fingerprint, existing));
            }
            Err(e) => return Err(Error::stage(PipelineStage::Persistence, e)),
        };

        let mut committed = vec!["document"];
        if let Err(e) = self.store.insert_chunks(document_id, chunks).await {
            return Err(Error::PartialWrite {
                committed,
                source: Box::new(e),
            });
        }
        committed.push("chunks");

        if !entities.is_empty() {
            if let Err(e) = self.store.insert_entities(document_id, entities).await {
                return Err(Error::PartialWrite {
                    committed,
                    source: Box::new(e),
                });
            }
        }

        debug!(
            job_id = %ctx.job_id,
            document_id = %document_id,
            chunk_count,
            entity_count,
            "Persisted document"
        );
        ctx.report_progress(
            PipelineStage::Complete.checkpoint(),
            PipelineStage::Complete.message(),
        );

        Ok(json!({
            "status": "success",
            "document_id": document_id,
            "file_hash": fingerprint,
            "text_length": text_length,
            "chunk_count": chunk_count,
            "entity_count": entity_count,
        }))
    }
}

#[async_trait]
impl JobHandler for IngestionHandler {
    async fn execute(&self, ctx: JobContext) -> Result<JsonValue> {
        let start = Instant::now();
        let _upload = OwnedUpload::from_raw(&ctx.params);
        let params = IngestParams::from_json(&ctx.params)?;

        let result = self.run(&ctx, &params).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(value) => info!(
                job_id = %ctx.job_id,
                filename = %params.display_name(),
                status = value["status"].as_str().unwrap_or_default(),
                duration_ms,
                "Document ingestion finished"
            ),
            Err(e) => warn!(
                job_id = %ctx.job_id,
                filename = %params.display_name(),
                error = %e,
                duration_ms,
                "Document ingestion failed"
            ),
        }
        result
    }
}
