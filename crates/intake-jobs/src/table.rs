//! Shared job table.
//!
//! Every job record lives here from submission until the process ends.
//! Workers, progress callbacks and status queries all go through one lock,
//! which also guards the running-job counter. The lock is a `std` lock
//! because progress callbacks are synchronous.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use intake_core::{Error, Job, JobStatus, JobView, Result};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    running: usize,
}

/// In-memory job records keyed by id.
#[derive(Default)]
pub struct JobTable {
    inner: RwLock<Inner>,
}

/// What a worker needs to run a job it has just started.
#[derive(Debug, Clone)]
pub struct StartedJob {
    pub id: Uuid,
    pub job_type: String,
    pub params: JsonValue,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a record half-updated:
    // every mutation goes through a `Job` method that validates first.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, job: Job) {
        self.write().jobs.insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<JobView> {
        self.read().jobs.get(&id).map(Job::view)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobView> {
        let mut views: Vec<JobView> = self.read().jobs.values().map(Job::view).collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        views
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs currently `RUNNING`.
    pub fn running_count(&self) -> usize {
        self.read().running
    }

    /// Count jobs per status.
    pub fn status_counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for job in self.read().jobs.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        counts
    }

    /// Move a job to `RUNNING`.
    pub fn start(&self, id: Uuid) -> Result<StartedJob> {
        let mut inner = self.write();
        let job = inner.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.start()?;
        let started = StartedJob {
            id,
            job_type: job.job_type.clone(),
            params: job.params.clone(),
        };
        inner.running += 1;
        Ok(started)
    }

    /// Publish progress for a running job. Unknown or finished jobs are ignored.
    pub fn report_progress(&self, id: Uuid, fraction: f64, message: &str) {
        if let Some(job) = self.write().jobs.get_mut(&id) {
            job.set_progress(fraction, message);
        }
    }

    /// Move a running job to `DONE` with its result.
    pub fn complete(&self, id: Uuid, result: JsonValue) -> Result<()> {
        let mut inner = self.write();
        let job = inner.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.complete(result)?;
        inner.running = inner.running.saturating_sub(1);
        Ok(())
    }

    /// Move a running job to `ERROR`.
    pub fn fail(&self, id: Uuid, error: &str, diagnostic: Option<String>) -> Result<()> {
        let mut inner = self.write();
        let job = inner.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.fail(error, diagnostic)?;
        inner.running = inner.running.saturating_sub(1);
        Ok(())
    }
}
