//! Engine configuration.

use std::time::Duration;

use intake_core::defaults;

/// Configuration for the job engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of long-lived worker tasks draining the queue.
    pub workers: usize,
    /// Maximum number of jobs executing at once.
    pub max_concurrent: usize,
    /// Number of job ids the submission queue holds before rejecting.
    pub queue_capacity: usize,
    /// How long a worker waits on an empty queue before re-checking shutdown.
    pub dequeue_timeout: Duration,
    /// How long shutdown waits for in-flight jobs before aborting workers.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: defaults::JOB_WORKERS,
            max_concurrent: defaults::JOB_MAX_CONCURRENT,
            queue_capacity: defaults::JOB_QUEUE_CAPACITY,
            dequeue_timeout: Duration::from_millis(defaults::JOB_DEQUEUE_TIMEOUT_MS),
            shutdown_timeout: Duration::from_secs(defaults::JOB_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKERS` | `3` | Worker tasks draining the queue |
    /// | `JOB_MAX_CONCURRENT` | `3` | Max concurrently running jobs |
    /// | `JOB_QUEUE_CAPACITY` | `100` | Queue slots before `QueueFull` |
    /// | `JOB_DEQUEUE_TIMEOUT_MS` | `1000` | Idle wait between shutdown checks |
    /// | `JOB_SHUTDOWN_TIMEOUT_SECS` | `5` | Grace period for in-flight jobs |
    ///
    /// Counts are clamped to at least 1.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            workers: env_parse("JOB_WORKERS").unwrap_or(defaults.workers).max(1),
            max_concurrent: env_parse("JOB_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent)
                .max(1),
            queue_capacity: env_parse("JOB_QUEUE_CAPACITY")
                .unwrap_or(defaults.queue_capacity)
                .max(1),
            dequeue_timeout: env_parse("JOB_DEQUEUE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.dequeue_timeout),
            shutdown_timeout: env_parse("JOB_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }

    /// Set the number of worker tasks.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the submission queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the idle dequeue timeout.
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
