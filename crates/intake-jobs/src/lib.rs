//! # intake-jobs
//!
//! In-process job engine for intake.
//!
//! This crate provides:
//! - A bounded submission queue that rejects work when full
//! - A worker pool whose concurrency is capped by a semaphore
//! - An in-memory job table tracking status, progress and results
//! - A handler registry keyed by job type
//! - The `process_document` ingestion handler and its text extraction adapters
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use intake_jobs::{EchoHandler, EngineConfig, JobEngine};
//! use serde_json::json;
//!
//! # async fn run() -> intake_core::Result<()> {
//! let mut engine = JobEngine::new(EngineConfig::from_env());
//! engine.register_handler("echo", EchoHandler);
//! let handle = engine.start();
//!
//! let job_id = handle.submit("echo", json!({"hello": "world"}))?;
//! let view = handle
//!     .wait_for(job_id, Duration::from_millis(50), Duration::from_secs(5))
//!     .await?;
//! println!("{} -> {}", view.id, view.status);
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod extraction;
pub mod handler;
pub mod ingestion;
pub mod queue;
pub mod registry;
pub mod table;
pub mod worker;

pub use intake_core::{Error, JobKind, JobStatus, JobView, Result};

pub use config::EngineConfig;
pub use extraction::{
    detect_mime, ExtractionStrategy, ExtractorRouter, OfficeConvertExtractor, PdfTextExtractor,
    TextNativeExtractor,
};
pub use handler::{handler_fn, EchoHandler, JobContext, JobHandler, ProgressCallback};
pub use ingestion::{IngestParams, IngestionHandler};
pub use registry::HandlerRegistry;
pub use worker::{EngineHandle, JobEngine, ShutdownReport, WorkerEvent};
