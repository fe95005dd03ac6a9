//! Centralized default constants for the intake system.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Environment variables documented next to a constant override it
//! at startup.

// =============================================================================
// JOB ENGINE
// =============================================================================

/// Number of long-lived worker tasks draining the queue (`JOB_WORKERS`).
pub const JOB_WORKERS: usize = 3;

/// Maximum number of jobs executing at once (`JOB_MAX_CONCURRENT`).
pub const JOB_MAX_CONCURRENT: usize = 3;

/// Number of job ids the submission queue holds before rejecting (`JOB_QUEUE_CAPACITY`).
pub const JOB_QUEUE_CAPACITY: usize = 100;

/// How long a worker waits on an empty queue before re-checking shutdown (`JOB_DEQUEUE_TIMEOUT_MS`).
pub const JOB_DEQUEUE_TIMEOUT_MS: u64 = 1_000;

/// How long shutdown waits for in-flight jobs before aborting workers (`JOB_SHUTDOWN_TIMEOUT_SECS`).
pub const JOB_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Job type tag of the document ingestion pipeline.
pub const PROCESS_DOCUMENT_JOB: &str = "process_document";

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Overlap characters between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP: usize = 100;

/// Rough characters-per-token ratio used for chunk token estimates.
pub const CHARS_PER_TOKEN: usize = 4;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default generation model used for entity extraction.
pub const GEN_MODEL: &str = "qwen3:8b";

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Maximum characters of document text sent to the entity extractor.
pub const ENTITY_TEXT_LIMIT: usize = 4000;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Environment variable enabling the OCR fallback for scanned PDFs.
pub const ENV_OCR_ENABLED: &str = "OCR_ENABLED";

/// Trimmed text shorter than this is treated as an empty PDF text layer.
pub const OCR_MIN_TEXT_CHARS: usize = 50;

/// Maximum bytes read for a single submitted document.
pub const MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;

/// MIME type assumed when a submission carries none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
