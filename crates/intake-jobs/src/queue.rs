//! Bounded FIFO of job ids awaiting a worker.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use intake_core::{Error, Result};

/// Fixed-capacity submission queue shared by all workers.
///
/// Admission never blocks: a full queue is reported as `Error::QueueFull`.
/// Workers share one receiver and take turns dequeuing, so admission order
/// into workers is FIFO.
pub struct SubmissionQueue {
    tx: mpsc::Sender<Uuid>,
    rx: Mutex<mpsc::Receiver<Uuid>>,
    capacity: usize,
}

/// A reserved queue slot. Sending consumes it; dropping it frees the slot.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Uuid>,
}

impl QueueSlot<'_> {
    pub fn send(self, job_id: Uuid) {
        self.permit.send(job_id);
    }
}

impl SubmissionQueue {
    /// Create a queue holding at most `capacity` ids (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids currently waiting.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Reserve a slot without blocking.
    pub fn try_reserve(&self) -> Result<QueueSlot<'_>> {
        match self.tx.try_reserve() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(mpsc::error::TrySendError::Full(())) => Err(Error::QueueFull {
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(())) => Err(Error::ShuttingDown),
        }
    }

    /// Enqueue a job id without blocking.
    pub fn enqueue(&self, job_id: Uuid) -> Result<()> {
        self.try_reserve()?.send(job_id);
        Ok(())
    }

    /// Wait up to `timeout` for the next job id.
    ///
    /// Returns `None` on timeout so the caller can observe shutdown between
    /// attempts. Time spent waiting for another worker's turn counts against
    /// the timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Uuid> {
        tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .ok()
        .flatten()
    }
}
