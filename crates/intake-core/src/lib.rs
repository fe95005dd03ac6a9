//! # intake-core
//!
//! Core types, traits, and abstractions for the intake ingestion engine.
//!
//! This crate provides the foundational data structures (job records,
//! document records, pipeline stages) and the collaborator traits that the
//! other intake crates depend on.

pub mod defaults;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use fingerprint::{content_fingerprint, is_fingerprint};
pub use models::*;
pub use traits::*;
