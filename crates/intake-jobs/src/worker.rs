//! Job engine: submission, the worker pool, and lifecycle control.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use intake_core::{EngineStats, Error, Job, JobView, Result};

use crate::config::EngineConfig;
use crate::handler::{JobContext, JobHandler};
use crate::queue::SubmissionQueue;
use crate::registry::HandlerRegistry;
use crate::table::JobTable;

/// Event emitted by the job engine.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A job was accepted into the queue.
    JobQueued { job_id: Uuid, job_type: String },
    /// A job was started.
    JobStarted { job_id: Uuid, job_type: String },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        progress: f64,
        message: String,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: String },
    /// A job failed.
    JobFailed {
        job_id: Uuid,
        job_type: String,
        error: String,
    },
    /// A worker task started.
    WorkerStarted { worker: usize },
    /// A worker task stopped.
    WorkerStopped { worker: usize },
}

/// State shared by the engine, its handles, and every worker.
struct Shared {
    config: EngineConfig,
    queue: SubmissionQueue,
    table: Arc<JobTable>,
    event_tx: broadcast::Sender<WorkerEvent>,
    accepting: AtomicBool,
}

impl Shared {
    fn new(config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(intake_core::defaults::EVENT_BUS_CAPACITY);
        Self {
            queue: SubmissionQueue::new(config.queue_capacity),
            table: Arc::new(JobTable::new()),
            event_tx,
            accepting: AtomicBool::new(true),
            config,
        }
    }

    fn submit(&self, job_type: &str, params: JsonValue) -> Result<Uuid> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let slot = match self.queue.try_reserve() {
            Ok(slot) => slot,
            Err(e) => {
                warn!(
                    job_type,
                    queue_depth = self.queue.depth(),
                    capacity = self.queue.capacity(),
                    error = %e,
                    "Rejected job submission"
                );
                return Err(e);
            }
        };

        let job = Job::new(job_type, params);
        let job_id = job.id;
        self.table.insert(job);
        let _ = self.event_tx.send(WorkerEvent::JobQueued {
            job_id,
            job_type: job_type.to_string(),
        });
        slot.send(job_id);

        debug!(%job_id, job_type, queue_depth = self.queue.depth(), "Job queued");
        Ok(job_id)
    }

    fn status(&self, job_id: Uuid) -> Result<JobView> {
        self.table.get(job_id).ok_or(Error::JobNotFound(job_id))
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            queue_depth: self.queue.depth(),
            running_count: self.table.running_count(),
            max_queue_size: self.queue.capacity(),
            max_concurrent: self.config.max_concurrent,
        }
    }
}

/// The job engine before it is started.
///
/// Handlers are registered here; jobs may already be submitted and will wait
/// in the queue until [`JobEngine::start`] spawns the workers.
pub struct JobEngine {
    shared: Arc<Shared>,
    registry: HandlerRegistry,
}

impl JobEngine {
    /// Create a new engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            registry: HandlerRegistry::new(),
        }
    }

    /// Register a handler for a job type.
    pub fn register_handler<H: JobHandler + 'static>(
        &mut self,
        job_type: impl Into<String>,
        handler: H,
    ) -> &mut Self {
        self.registry.register(job_type, handler);
        self
    }

    /// Mutable access to the handler registry.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Submit a job. Never blocks; fails with `QueueFull` under backpressure.
    pub fn submit(&self, job_type: &str, params: JsonValue) -> Result<Uuid> {
        self.shared.submit(job_type, params)
    }

    pub fn status(&self, job_id: Uuid) -> Result<JobView> {
        self.shared.status(job_id)
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// Get a receiver for engine events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Freeze the registry, spawn the workers and return a handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> EngineHandle {
        let registry = Arc::new(self.registry);
        let slots = Arc::new(Semaphore::new(self.shared.config.max_concurrent));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            subsystem = "jobs",
            component = "engine",
            workers = self.shared.config.workers,
            max_concurrent = self.shared.config.max_concurrent,
            queue_capacity = self.shared.config.queue_capacity,
            handlers = ?registry.job_types(),
            "Job engine started"
        );

        let mut workers = JoinSet::new();
        for index in 0..self.shared.config.workers {
            let worker = Worker {
                index,
                shared: self.shared.clone(),
                registry: registry.clone(),
                slots: slots.clone(),
                shutdown_rx: shutdown_rx.clone(),
            };
            workers.spawn(worker.run());
        }

        EngineHandle {
            shared: self.shared,
            shutdown_tx: Arc::new(shutdown_tx),
            workers: Arc::new(Mutex::new(Some(workers))),
        }
    }
}

/// Outcome of [`EngineHandle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that finished within the grace period.
    pub stopped: usize,
    /// Workers aborted when the grace period ran out.
    pub aborted: usize,
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    workers: Arc<Mutex<Option<JoinSet<()>>>>,
}

impl EngineHandle {
    /// Submit a job. Never blocks; fails with `QueueFull` under backpressure.
    pub fn submit(&self, job_type: &str, params: JsonValue) -> Result<Uuid> {
        self.shared.submit(job_type, params)
    }

    /// Current view of a job, or `JobNotFound`.
    pub fn status(&self, job_id: Uuid) -> Result<JobView> {
        self.shared.status(job_id)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobView> {
        self.shared.table.list()
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// Get a receiver for engine events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Poll a job until it reaches a terminal state or `timeout` elapses.
    pub async fn wait_for(
        &self,
        job_id: Uuid,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<JobView> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.status(job_id)?;
            if view.status.is_terminal() || Instant::now() >= deadline {
                return Ok(view);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Stop accepting work and wait for workers to finish.
    ///
    /// Workers stop dequeuing at their next shutdown check. In-flight jobs
    /// get up to the configured shutdown timeout; workers still busy after
    /// that are aborted. Jobs left in the queue stay `QUEUED`.
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        self.shutdown_with_timeout(self.shared.config.shutdown_timeout)
            .await
    }

    /// [`EngineHandle::shutdown`] with an explicit grace period.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "engine"))]
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<ShutdownReport> {
        self.shared.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let Some(mut workers) = self.workers.lock().await.take() else {
            return Err(Error::ShuttingDown);
        };

        let total = workers.len();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = ?e, "Worker task panicked");
                }
            }
        })
        .await;

        let aborted = if drained.is_err() {
            let remaining = workers.len();
            warn!(
                remaining,
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown timeout elapsed, aborting workers"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
            remaining
        } else {
            0
        };

        info!(stopped = total - aborted, aborted, "Job engine stopped");
        Ok(ShutdownReport {
            stopped: total - aborted,
            aborted,
        })
    }
}

/// One long-lived execution unit draining the queue.
struct Worker {
    index: usize,
    shared: Arc<Shared>,
    registry: Arc<HandlerRegistry>,
    slots: Arc<Semaphore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    #[instrument(skip(self), fields(subsystem = "jobs", worker = self.index))]
    async fn run(mut self) {
        debug!("Worker started");
        let _ = self
            .shared
            .event_tx
            .send(WorkerEvent::WorkerStarted { worker: self.index });

        let dequeue_timeout = self.shared.config.dequeue_timeout;

        loop {
            if *self.shutdown_rx.borrow() {
                debug!("Worker received shutdown signal");
                break;
            }

            let dequeued = tokio::select! {
                job_id = self.shared.queue.dequeue(dequeue_timeout) => job_id,
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let Some(job_id) = dequeued else {
                continue;
            };

            let acquired = tokio::select! {
                permit = self.slots.clone().acquire_owned() => Some(permit),
                _ = self.shutdown_rx.wait_for(|stop| *stop) => None,
            };
            let permit = match acquired {
                Some(Ok(permit)) => permit,
                Some(Err(_)) => {
                    error!(%job_id, "Concurrency slots closed, stopping worker");
                    break;
                }
                None => {
                    debug!(%job_id, "Shutdown while waiting for a slot, job stays queued");
                    break;
                }
            };
            // Both branches can be ready at once; shutdown wins.
            if *self.shutdown_rx.borrow() {
                debug!(%job_id, "Shutdown before job start, job stays queued");
                break;
            }

            self.execute_job(job_id).await;
            drop(permit);
        }

        let _ = self
            .shared
            .event_tx
            .send(WorkerEvent::WorkerStopped { worker: self.index });
        debug!("Worker stopped");
    }

    /// Run one dequeued job to a terminal state. Never propagates failure.
    async fn execute_job(&self, job_id: Uuid) {
        let start = Instant::now();
        let table = &self.shared.table;

        let job = match table.start(job_id) {
            Ok(job) => job,
            Err(e) => {
                error!(%job_id, error = %e, "Failed to start dequeued job");
                return;
            }
        };
        let job_type = job.job_type.clone();

        info!(%job_id, job_type = %job_type, "Processing job");
        let _ = self.shared.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            job_type: job_type.clone(),
        });

        let outcome = match self.registry.get(&job_type) {
            Some(handler) => {
                let progress_table = table.clone();
                let event_tx = self.shared.event_tx.clone();
                let ctx = JobContext::new(job.id, job.job_type, job.params)
                    .with_progress_callback(move |progress, message| {
                        progress_table.report_progress(job_id, progress, message);
                        let _ = event_tx.send(WorkerEvent::JobProgress {
                            job_id,
                            progress,
                            message: message.to_string(),
                        });
                    });

                match AssertUnwindSafe(handler.execute(ctx)).catch_unwind().await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err((e.to_string(), Some(e.diagnostic()))),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        Err((format!("Handler panicked: {}", message), Some(message)))
                    }
                }
            }
            None => {
                warn!(%job_id, job_type = %job_type, "No handler registered for job type");
                Err((Error::UnregisteredHandler(job_type.clone()).to_string(), None))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => match table.complete(job_id, result) {
                Ok(()) => {
                    info!(%job_id, job_type = %job_type, duration_ms, "Job completed successfully");
                    let _ = self
                        .shared
                        .event_tx
                        .send(WorkerEvent::JobCompleted { job_id, job_type });
                }
                Err(e) => error!(%job_id, error = %e, "Failed to mark job as completed"),
            },
            Err((message, diagnostic)) => match table.fail(job_id, &message, diagnostic) {
                Ok(()) => {
                    warn!(%job_id, job_type = %job_type, error = %message, duration_ms, "Job failed");
                    let _ = self.shared.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        job_type,
                        error: message,
                    });
                }
                Err(e) => error!(%job_id, error = %e, "Failed to mark job as failed"),
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
