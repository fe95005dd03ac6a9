//! Handler registry mapping job-type tags to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use intake_core::{Error, JobKind, Result};

use crate::handler::JobHandler;

/// Registry of job handlers.
///
/// Populated before the engine starts, then frozen behind an `Arc` and read
/// by workers without locking.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any existing handler for the same type.
    pub fn register<H: JobHandler + 'static>(&mut self, job_type: impl Into<String>, handler: H) {
        self.register_arc(job_type, Arc::new(handler));
    }

    /// Register a shared handler.
    pub fn register_arc(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        debug!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Register the handler for a built-in job kind.
    pub fn register_kind<H: JobHandler + 'static>(&mut self, kind: JobKind, handler: H) {
        self.register(kind.as_str(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail unless every listed built-in kind has a handler.
    ///
    /// Called at startup so a missing built-in handler is a boot error
    /// rather than a stream of failed jobs.
    pub fn ensure_registered(&self, kinds: &[JobKind]) -> Result<()> {
        let missing: Vec<&str> = kinds
            .iter()
            .map(JobKind::as_str)
            .filter(|tag| !self.contains(tag))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "No handler registered for job kinds: {}",
                missing.join(", ")
            )))
        }
    }
}
