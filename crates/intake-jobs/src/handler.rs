//! Job handlers and the context passed to them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use intake_core::Result;

/// Progress callback type for job handlers: `(fraction, message)`.
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// Id of the job being processed.
    pub job_id: Uuid,
    /// Type tag the job was submitted under.
    pub job_type: String,
    /// The job's immutable input payload.
    pub params: JsonValue,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job_id: Uuid, job_type: impl Into<String>, params: JsonValue) -> Self {
        Self {
            job_id,
            job_type: job_type.into(),
            params,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Report progress in `[0.0, 1.0]`.
    ///
    /// Handlers are expected to report non-decreasing fractions; nothing here
    /// enforces it.
    pub fn report_progress(&self, fraction: f64, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(fraction, message);
        }
    }

    /// A cloneable reporter for work spawned by the handler.
    pub fn reporter(&self) -> Option<ProgressCallback> {
        self.progress_callback.clone()
    }
}

/// Trait for job handlers.
///
/// Returning `Err` (or panicking) marks the job `ERROR`; returning `Ok` marks
/// it `DONE` with the value as its result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> Result<JsonValue>;
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Build a handler from an async closure.
///
/// ```rust
/// use intake_jobs::handler::handler_fn;
///
/// let echo = handler_fn(|ctx| async move {
///     ctx.report_progress(0.5, "halfway");
///     Ok(ctx.params)
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> Result<JsonValue> {
        (self.f)(ctx).await
    }
}

/// Handler that reports progress and returns its params unchanged.
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn execute(&self, ctx: JobContext) -> Result<JsonValue> {
        ctx.report_progress(0.5, "halfway");
        Ok(ctx.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_report_progress_without_callback_is_noop() {
        let ctx = JobContext::new(Uuid::now_v7(), "echo", json!({}));
        ctx.report_progress(0.5, "nobody listening");
        assert!(ctx.reporter().is_none());
    }

    #[test]
    fn test_report_progress_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = JobContext::new(Uuid::now_v7(), "echo", json!({}))
            .with_progress_callback(move |f, m| sink.lock().unwrap().push((f, m.to_string())));

        ctx.report_progress(0.25, "quarter");
        ctx.report_progress(0.75, "most");

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(0.25, "quarter".to_string()), (0.75, "most".to_string())]
        );
    }

    #[tokio::test]
    async fn test_echo_handler_returns_params() {
        let params = json!({"a": [1, 2, 3]});
        let ctx = JobContext::new(Uuid::now_v7(), "echo", params.clone());
        assert_eq!(EchoHandler.execute(ctx).await.unwrap(), params);
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = handler_fn(|ctx: JobContext| async move {
            Ok(json!({"type": ctx.job_type}))
        });
        let ctx = JobContext::new(Uuid::now_v7(), "custom", json!(null));
        assert_eq!(handler.execute(ctx).await.unwrap(), json!({"type": "custom"}));
    }
}
