//! Error types for intake.

use thiserror::Error;

use crate::models::PipelineStage;

/// Result type alias using intake's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for intake operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The submission queue is at capacity (backpressure). Retryable by the caller.
    #[error("Job queue is full (capacity {capacity}) - try again later")]
    QueueFull { capacity: usize },

    /// The engine has begun shutting down and accepts no new work.
    #[error("Job engine is shutting down")]
    ShuttingDown,

    /// No handler is registered for the job's type (configuration fault).
    #[error("No handler registered for job type: {0}")]
    UnregisteredHandler(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// A job record was asked to move through its lifecycle out of order.
    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: uuid::Uuid,
        from: &'static str,
        to: &'static str,
    },

    /// A named ingestion pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<Error>,
    },

    /// Persistence failed after some writes were already committed.
    /// Committed writes are not rolled back.
    #[error("Partial write: committed [{}] before failure: {source}", .committed.join(", "))]
    PartialWrite {
        committed: Vec<&'static str>,
        #[source]
        source: Box<Error>,
    },

    /// A document with the same content fingerprint already exists.
    #[error("Duplicate fingerprint: {0}")]
    DuplicateFingerprint(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Text extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error as the failure of a pipeline stage.
    pub fn stage(stage: PipelineStage, source: Error) -> Self {
        Error::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueFull { .. })
    }

    /// Render the error and its source chain, one cause per line.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("{self}");
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_queue_full() {
        let err = Error::QueueFull { capacity: 2 };
        assert_eq!(
            err.to_string(),
            "Job queue is full (capacity 2) - try again later"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display_unregistered_handler_names_type() {
        let err = Error::UnregisteredHandler("no-such-type".to_string());
        assert!(err.to_string().contains("no-such-type"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Job not found: {}", id));
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err = Error::InvalidTransition {
            job_id: Uuid::nil(),
            from: "DONE",
            to: "RUNNING",
        };
        assert!(err.to_string().contains("DONE -> RUNNING"));
    }

    #[test]
    fn test_stage_error_names_stage_and_cause() {
        let err = Error::stage(
            PipelineStage::TextExtraction,
            Error::Extraction("no text".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "text_extraction stage failed: Extraction error: no text"
        );
    }

    #[test]
    fn test_partial_write_lists_committed_writes() {
        let err = Error::PartialWrite {
            committed: vec!["document", "chunks"],
            source: Box::new(Error::Store("connection reset".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("document, chunks"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_diagnostic_walks_source_chain() {
        let err = Error::stage(
            PipelineStage::Persistence,
            Error::Store("disk full".to_string()),
        );
        let diagnostic = err.diagnostic();
        let lines: Vec<&str> = diagnostic.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("persistence stage failed"));
        assert_eq!(lines[1], "caused by: Store error: disk full");
    }

    #[test]
    fn test_diagnostic_without_source_is_message() {
        let err = Error::Internal("boom".to_string());
        assert_eq!(err.diagnostic(), "Internal error: boom");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
