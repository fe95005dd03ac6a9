//! Integration tests for the job engine.
//!
//! Covers admission under backpressure, the concurrency cap, status and
//! progress monotonicity, and failure capture at the worker boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use intake_core::{Error, JobStatus};
use intake_jobs::{handler_fn, EchoHandler, EngineConfig, JobEngine, JobView, WorkerEvent};
use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

const POLL: Duration = Duration::from_millis(5);
const WAIT: Duration = Duration::from_secs(10);

fn config(workers: usize, max_concurrent: usize, capacity: usize) -> EngineConfig {
    EngineConfig::default()
        .with_workers(workers)
        .with_max_concurrent(max_concurrent)
        .with_queue_capacity(capacity)
        .with_dequeue_timeout(Duration::from_millis(20))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// Engine with `echo`, `boom` (error), `panic` and `sleep` handlers.
fn engine_with_handlers(config: EngineConfig) -> JobEngine {
    let mut engine = JobEngine::new(config);
    engine
        .register_handler("echo", EchoHandler)
        .register_handler(
            "boom",
            handler_fn(|ctx| async move {
                ctx.report_progress(0.4, "about to fail");
                Err(Error::Internal("boom".to_string()))
            }),
        )
        .register_handler(
            "panic",
            handler_fn(|ctx| async move {
                ctx.report_progress(0.4, "about to panic");
                if ctx.params.is_object() {
                    panic!("handler exploded");
                }
                Ok(json!(null))
            }),
        )
        .register_handler(
            "sleep",
            handler_fn(|ctx| async move {
                let ms = ctx.params["ms"].as_u64().unwrap_or(10);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({"slept_ms": ms}))
            }),
        );
    engine
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// ADMISSION
// ============================================================================

#[tokio::test]
async fn test_queue_full_at_capacity_plus_one() {
    let engine = JobEngine::new(config(1, 1, 3));

    for i in 0..3 {
        engine.submit("echo", json!({ "n": i })).unwrap();
    }
    let err = engine.submit("echo", json!({ "n": 3 })).unwrap_err();

    assert!(matches!(err, Error::QueueFull { capacity: 3 }));
    assert!(err.is_retryable());

    let stats = engine.stats();
    assert_eq!(stats.queue_depth, 3);
    assert_eq!(stats.max_queue_size, 3);
    assert_eq!(stats.running_count, 0);
}

#[tokio::test]
async fn test_rejected_submission_leaves_no_record() {
    let engine = JobEngine::new(config(1, 1, 1));
    let accepted = engine.submit("echo", json!({})).unwrap();
    assert!(engine.submit("echo", json!({})).is_err());

    let handle = engine.start();
    handle.wait_for(accepted, POLL, WAIT).await.unwrap();
    assert_eq!(handle.list().len(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_capacity_two_concurrency_one_scenario() {
    let gate = Arc::new(Semaphore::new(0));
    let mut engine = JobEngine::new(config(1, 1, 2));
    let handler_gate = gate.clone();
    engine.register_handler(
        "gated",
        handler_fn(move |ctx| {
            let gate = handler_gate.clone();
            async move {
                let _ = gate.acquire().await;
                Ok(ctx.params)
            }
        }),
    );

    let a = engine.submit("gated", json!({"job": "A"})).unwrap();
    let b = engine.submit("gated", json!({"job": "B"})).unwrap();
    let c = engine.submit("gated", json!({"job": "C"}));
    assert!(matches!(c, Err(Error::QueueFull { .. })));

    let handle = engine.start();
    wait_until(|| handle.status(a).unwrap().status == JobStatus::Running).await;

    let d = handle.submit("gated", json!({"job": "D"})).unwrap();
    assert_eq!(handle.stats().queue_depth, 2);
    assert_eq!(handle.status(b).unwrap().status, JobStatus::Queued);

    gate.add_permits(10);
    for id in [a, b, d] {
        let view = handle.wait_for(id, POLL, WAIT).await.unwrap();
        assert_eq!(view.status, JobStatus::Done);
    }
    handle.shutdown().await.unwrap();
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[tokio::test]
async fn test_echo_job_completes_with_params() {
    let handle = engine_with_handlers(config(2, 2, 10)).start();
    let params = json!({"message": "hi", "n": [1, 2, 3]});

    let id = handle.submit("echo", params.clone()).unwrap();
    let view = handle.wait_for(id, POLL, WAIT).await.unwrap();

    assert_eq!(view.status, JobStatus::Done);
    assert_eq!(view.progress, 1.0);
    assert_eq!(view.result, Some(params));
    assert!(view.error.is_none());
    assert!(view.started_at.is_some());
    assert!(view.completed_at >= view.started_at);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handler_error_marks_job_error() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();

    let id = handle.submit("boom", json!({})).unwrap();
    let view = handle.wait_for(id, POLL, WAIT).await.unwrap();

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.progress, 0.4);
    assert!(view.error.as_deref().is_some_and(|e| e.contains("boom")));
    assert!(view.result.is_none());
    assert!(view.completed_at.is_some());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handler_panic_marks_job_error_and_worker_survives() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();

    let id = handle.submit("panic", json!({})).unwrap();
    let view = handle.wait_for(id, POLL, WAIT).await.unwrap();

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.progress, 0.4);
    assert!(view.error.as_deref().unwrap().starts_with("Handler panicked"));
    assert_eq!(view.diagnostic.as_deref(), Some("handler exploded"));

    // The single worker keeps serving after the panic.
    let next = handle.submit("echo", json!({"after": "panic"})).unwrap();
    let view = handle.wait_for(next, POLL, WAIT).await.unwrap();
    assert_eq!(view.status, JobStatus::Done);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_type_reaches_error() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();

    let id = handle.submit("no-such-type", json!({})).unwrap();
    let view = handle.wait_for(id, POLL, WAIT).await.unwrap();

    assert_eq!(view.status, JobStatus::Error);
    assert!(view.error.as_deref().unwrap().contains("no-such-type"));
    assert!(view.started_at.is_some());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_job_id_is_not_found() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();
    let missing = Uuid::now_v7();
    assert!(matches!(handle.status(missing), Err(Error::JobNotFound(id)) if id == missing));
    handle.shutdown().await.unwrap();
}

// ============================================================================
// CONCURRENCY AND MONOTONICITY
// ============================================================================

#[tokio::test]
async fn test_running_never_exceeds_max_concurrent() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut engine = JobEngine::new(config(6, 2, 50));
    let (cur, pk) = (current.clone(), peak.clone());
    engine.register_handler(
        "counted",
        handler_fn(move |_ctx| {
            let (cur, pk) = (cur.clone(), pk.clone());
            async move {
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                pk.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(null))
            }
        }),
    );
    let handle = engine.start();

    let ids: Vec<Uuid> = (0..20)
        .map(|_| handle.submit("counted", json!({})).unwrap())
        .collect();

    let mut sampled_max = 0;
    for id in &ids {
        loop {
            sampled_max = sampled_max.max(handle.stats().running_count);
            if handle.status(*id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(sampled_max <= 2);
    assert!(handle
        .list()
        .iter()
        .all(|view| view.status == JobStatus::Done));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_and_progress_are_monotonic() {
    let mut engine = JobEngine::new(config(1, 1, 10));
    engine.register_handler(
        "stepper",
        handler_fn(|ctx| async move {
            for step in 1..=8 {
                ctx.report_progress(step as f64 / 10.0, &format!("step {}", step));
                tokio::time::sleep(Duration::from_millis(3)).await;
            }
            Ok(json!({"steps": 8}))
        }),
    );
    let handle = engine.start();
    let id = handle.submit("stepper", json!({})).unwrap();

    let mut observed: Vec<JobView> = Vec::new();
    loop {
        let view = handle.status(id).unwrap();
        let done = view.status.is_terminal();
        observed.push(view);
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for pair in observed.windows(2) {
        assert!(pair[0].status.rank() <= pair[1].status.rank());
        assert!(pair[0].progress <= pair[1].progress);
    }
    assert_eq!(observed.last().unwrap().status, JobStatus::Done);
    assert_eq!(observed.last().unwrap().progress, 1.0);
    handle.shutdown().await.unwrap();
}

// ============================================================================
// EVENTS AND LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_events_follow_job_lifecycle() {
    let engine = engine_with_handlers(config(1, 1, 10));
    let mut events = engine.events();
    let handle = engine.start();

    let ok = handle.submit("echo", json!({})).unwrap();
    let bad = handle.submit("boom", json!({})).unwrap();
    handle.wait_for(ok, POLL, WAIT).await.unwrap();
    handle.wait_for(bad, POLL, WAIT).await.unwrap();
    handle.shutdown().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let queued = seen
        .iter()
        .position(|e| matches!(e, WorkerEvent::JobQueued { job_id, .. } if *job_id == ok));
    let started = seen
        .iter()
        .position(|e| matches!(e, WorkerEvent::JobStarted { job_id, .. } if *job_id == ok));
    let completed = seen
        .iter()
        .position(|e| matches!(e, WorkerEvent::JobCompleted { job_id, .. } if *job_id == ok));
    assert!(queued.unwrap() < started.unwrap());
    assert!(started.unwrap() < completed.unwrap());

    assert!(seen
        .iter()
        .any(|e| matches!(e, WorkerEvent::JobFailed { job_id, error, .. } if *job_id == bad && error.contains("boom"))));
    assert!(seen
        .iter()
        .any(|e| matches!(e, WorkerEvent::WorkerStopped { worker: 0 })));
}

#[tokio::test]
async fn test_jobs_submitted_before_start_run_after_start() {
    let engine = engine_with_handlers(config(2, 2, 10));
    let id = engine.submit("sleep", json!({"ms": 5})).unwrap();
    assert_eq!(engine.status(id).unwrap().status, JobStatus::Queued);

    let handle = engine.start();
    let view = handle.wait_for(id, POLL, WAIT).await.unwrap();
    assert_eq!(view.status, JobStatus::Done);
    assert_eq!(view.result, Some(json!({"slept_ms": 5})));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();
    let first = handle.submit("echo", json!({"n": 1})).unwrap();
    let second = handle.submit("echo", json!({"n": 2})).unwrap();
    handle.wait_for(second, POLL, WAIT).await.unwrap();

    let ids: Vec<Uuid> = handle.list().iter().map(|view| view.id).collect();
    assert_eq!(ids, vec![second, first]);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_rejects_new_work_and_is_idempotent_error() {
    let handle = engine_with_handlers(config(2, 2, 10)).start();
    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.stopped, 2);
    assert_eq!(report.aborted, 0);

    assert!(matches!(
        handle.submit("echo", json!({})),
        Err(Error::ShuttingDown)
    ));
    assert!(matches!(handle.shutdown().await, Err(Error::ShuttingDown)));
}

#[tokio::test]
async fn test_job_waiting_for_slot_is_not_started_after_shutdown() {
    let gate = Arc::new(Semaphore::new(0));
    let mut engine = JobEngine::new(config(2, 1, 10));
    let handler_gate = gate.clone();
    engine.register_handler(
        "gated",
        handler_fn(move |ctx| {
            let gate = handler_gate.clone();
            async move {
                let _ = gate.acquire().await;
                Ok(ctx.params)
            }
        }),
    );
    let handle = engine.start();
    let mut events = handle.events();

    let a = handle.submit("gated", json!({"job": "A"})).unwrap();
    wait_until(|| handle.status(a).unwrap().status == JobStatus::Running).await;
    // The idle worker takes B off the queue and blocks on the only slot.
    let b = handle.submit("gated", json!({"job": "B"})).unwrap();
    wait_until(|| handle.stats().queue_depth == 0).await;

    let shutdown = tokio::spawn({
        let handle = handle.clone();
        async move { handle.shutdown().await }
    });

    // The blocked worker exits without waiting for A to release the slot.
    tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(WorkerEvent::WorkerStopped { .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .expect("blocked worker did not stop");

    gate.add_permits(10);
    let report = shutdown.await.unwrap().unwrap();
    assert_eq!(report.stopped, 2);
    assert_eq!(handle.status(a).unwrap().status, JobStatus::Done);
    assert_eq!(handle.status(b).unwrap().status, JobStatus::Queued);
}

#[tokio::test]
async fn test_shutdown_aborts_stuck_workers_after_timeout() {
    let handle = engine_with_handlers(config(1, 1, 10)).start();
    let id = handle.submit("sleep", json!({"ms": 60_000})).unwrap();
    wait_until(|| handle.status(id).unwrap().status == JobStatus::Running).await;

    let report = handle
        .shutdown_with_timeout(Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(report.aborted, 1);
    // No cancellation: the aborted job is left as it was.
    assert_eq!(handle.status(id).unwrap().status, JobStatus::Running);
}
