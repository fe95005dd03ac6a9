//! Core data models for intake.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

pub use pgvector::Vector;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Lifecycle status of a job.
///
/// Transitions are strictly `Queued -> Running -> {Done | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Position in the lifecycle; terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Error => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in job kinds shipped with intake.
///
/// Handlers are registered under [`JobKind::as_str`]; ad-hoc job types may
/// still be registered under any other tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Run the document ingestion pipeline.
    ProcessDocument,
}

impl JobKind {
    /// Every built-in kind, for exhaustive startup validation.
    pub const ALL: [JobKind; 1] = [JobKind::ProcessDocument];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ProcessDocument => crate::defaults::PROCESS_DOCUMENT_JOB,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown job kind: {}", s)))
    }
}

/// A submitted unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub params: JsonValue,
    pub progress: f64,
    pub progress_message: String,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub diagnostic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job with a fresh time-ordered id.
    pub fn new(job_type: impl Into<String>, params: JsonValue) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.into(),
            status: JobStatus::Queued,
            params,
            progress: 0.0,
            progress_message: String::new(),
            result: None,
            error: None,
            diagnostic: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Queued -> Running`; records `started_at`.
    pub fn start(&mut self) -> Result<()> {
        self.check_transition(JobStatus::Queued, JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now().max(self.created_at));
        Ok(())
    }

    /// Publish progress while running. Ignored once the job is terminal.
    ///
    /// The fraction is clamped into `[0.0, 1.0]`; non-finite values leave the
    /// previous fraction in place but still update the message.
    pub fn set_progress(&mut self, fraction: f64, message: &str) {
        if self.status != JobStatus::Running {
            return;
        }
        if fraction.is_finite() {
            self.progress = fraction.clamp(0.0, 1.0);
        }
        self.progress_message = message.to_string();
    }

    /// `Running -> Done`; stores the result and forces progress to 1.0.
    pub fn complete(&mut self, result: JsonValue) -> Result<()> {
        self.check_transition(JobStatus::Running, JobStatus::Done)?;
        self.status = JobStatus::Done;
        self.progress = 1.0;
        self.result = Some(result);
        self.completed_at = Some(self.finish_time());
        Ok(())
    }

    /// `Running -> Error`; progress stays at its last reported value.
    pub fn fail(&mut self, error: impl Into<String>, diagnostic: Option<String>) -> Result<()> {
        self.check_transition(JobStatus::Running, JobStatus::Error)?;
        self.status = JobStatus::Error;
        self.error = Some(error.into());
        self.diagnostic = diagnostic;
        self.completed_at = Some(self.finish_time());
        Ok(())
    }

    /// Read-only projection returned to callers.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            job_type: self.job_type.clone(),
            status: self.status,
            progress: self.progress,
            message: self.progress_message.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.clone(),
            error: self.error.clone(),
            diagnostic: self.diagnostic.clone(),
        }
    }

    fn finish_time(&self) -> DateTime<Utc> {
        Utc::now().max(self.started_at.unwrap_or(self.created_at))
    }

    fn check_transition(&self, expected: JobStatus, to: JobStatus) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                job_id: self.id,
                from: self.status.as_str(),
                to: to.as_str(),
            })
        }
    }
}

/// Status snapshot of a job as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Operational statistics of the job engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Job ids waiting in the submission queue.
    pub queue_depth: usize,
    /// Jobs currently in `RUNNING`.
    pub running_count: usize,
    /// Capacity of the submission queue.
    pub max_queue_size: usize,
    /// Concurrency cap on running jobs.
    pub max_concurrent: usize,
}

// =============================================================================
// INGESTION TYPES
// =============================================================================

/// Discrete phases of the document ingestion pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fingerprint,
    TextExtraction,
    EntityExtraction,
    Embedding,
    Persistence,
    Complete,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Fingerprint,
        PipelineStage::TextExtraction,
        PipelineStage::EntityExtraction,
        PipelineStage::Embedding,
        PipelineStage::Persistence,
        PipelineStage::Complete,
    ];

    /// Progress checkpoint reported when the stage begins.
    pub fn checkpoint(&self) -> f64 {
        match self {
            PipelineStage::Fingerprint => 0.1,
            PipelineStage::TextExtraction => 0.3,
            PipelineStage::EntityExtraction => 0.6,
            PipelineStage::Embedding => 0.8,
            PipelineStage::Persistence => 0.9,
            PipelineStage::Complete => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Fingerprint => "fingerprint",
            PipelineStage::TextExtraction => "text_extraction",
            PipelineStage::EntityExtraction => "entity_extraction",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Persistence => "persistence",
            PipelineStage::Complete => "complete",
        }
    }

    /// Progress message reported when the stage begins.
    pub fn message(&self) -> &'static str {
        match self {
            PipelineStage::Fingerprint => "Computing file hash...",
            PipelineStage::TextExtraction => "Extracting text...",
            PipelineStage::EntityExtraction => "Extracting entities...",
            PipelineStage::Embedding => "Generating embeddings...",
            PipelineStage::Persistence => "Storing in database...",
            PipelineStage::Complete => "Processing complete",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named entity found in document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Document record written first during persistence.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub fingerprint: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: u64,
    pub text: String,
}

impl NewDocument {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Embedded text chunk written after the document record.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub token_count: usize,
    pub embedding: Vector,
}

/// A stored document as returned by a store lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub fingerprint: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: u64,
    pub char_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_status_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"QUEUED\"");
        assert_eq!(serde_json::to_string(&JobStatus::Done).unwrap(), "\"DONE\"");
        let parsed: JobStatus = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(parsed, JobStatus::Error);
    }

    #[test]
    fn test_job_status_terminal_and_rank() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Queued.rank() < JobStatus::Running.rank());
        assert_eq!(JobStatus::Done.rank(), JobStatus::Error.rank());
    }

    #[test]
    fn test_job_kind_round_trip_str() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("no-such-type".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new("echo", json!({"a": 1}));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("echo", json!({}));
        let b = Job::new("echo", json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_job_success_lifecycle() {
        let mut job = Job::new("echo", json!({}));
        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        job.set_progress(0.5, "halfway");
        assert_eq!(job.progress, 0.5);
        assert_eq!(job.progress_message, "halfway");

        job.complete(json!({"ok": true})).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result, Some(json!({"ok": true})));

        let started = job.started_at.unwrap();
        let completed = job.completed_at.unwrap();
        assert!(job.created_at <= started);
        assert!(started <= completed);
    }

    #[test]
    fn test_job_failure_keeps_progress() {
        let mut job = Job::new("boom", json!({}));
        job.start().unwrap();
        job.set_progress(0.4, "working");
        job.fail("exploded", Some("trace".to_string())).unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 0.4);
        assert_eq!(job.error.as_deref(), Some("exploded"));
        assert_eq!(job.diagnostic.as_deref(), Some("trace"));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_job_rejects_out_of_order_transitions() {
        let mut job = Job::new("echo", json!({}));
        assert!(job.complete(json!({})).is_err());
        assert!(job.fail("nope", None).is_err());
        assert_eq!(job.status, JobStatus::Queued);

        job.start().unwrap();
        assert!(job.start().is_err());

        job.complete(json!({})).unwrap();
        assert!(job.start().is_err());
        assert!(job.fail("late", None).is_err());
        assert!(job.complete(json!({})).is_err());
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_set_progress_clamps_and_ignores_outside_running() {
        let mut job = Job::new("echo", json!({}));
        job.set_progress(0.7, "too early");
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.progress_message, "");

        job.start().unwrap();
        job.set_progress(1.7, "over");
        assert_eq!(job.progress, 1.0);
        job.set_progress(-3.0, "under");
        assert_eq!(job.progress, 0.0);
        job.set_progress(0.2, "ok");
        job.set_progress(f64::NAN, "nan");
        assert_eq!(job.progress, 0.2);
        assert_eq!(job.progress_message, "nan");

        job.fail("x", None).unwrap();
        job.set_progress(0.9, "after");
        assert_eq!(job.progress, 0.2);
        assert_eq!(job.progress_message, "nan");
    }

    #[test]
    fn test_job_view_serialization() {
        let mut job = Job::new("echo", json!({"k": "v"}));
        let view = job.view();
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], "echo");
        assert_eq!(value["status"], "QUEUED");
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
        assert!(value.get("started_at").is_none());

        job.start().unwrap();
        job.complete(json!({"k": "v"})).unwrap();
        let value = serde_json::to_value(job.view()).unwrap();
        assert_eq!(value["status"], "DONE");
        assert_eq!(value["progress"], 1.0);
        assert_eq!(value["result"]["k"], "v");
    }

    #[test]
    fn test_pipeline_checkpoints_strictly_increase() {
        let checkpoints: Vec<f64> = PipelineStage::ALL.iter().map(|s| s.checkpoint()).collect();
        assert!(checkpoints.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(checkpoints.first(), Some(&0.1));
        assert_eq!(checkpoints.last(), Some(&1.0));
    }

    #[test]
    fn test_pipeline_stage_display() {
        assert_eq!(PipelineStage::TextExtraction.to_string(), "text_extraction");
        assert_eq!(
            serde_json::to_string(&PipelineStage::EntityExtraction).unwrap(),
            "\"entity_extraction\""
        );
    }

    #[test]
    fn test_entity_serializes_type_field() {
        let entity = Entity::new("Acme Corp", "organization").with_description("plaintiff");
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["type"], "organization");
        assert_eq!(value["description"], "plaintiff");

        let parsed: Entity =
            serde_json::from_value(json!({"name": "Jane", "type": "person"})).unwrap();
        assert!(parsed.description.is_none());
    }

    #[test]
    fn test_new_document_char_count_counts_chars() {
        let doc = NewDocument {
            fingerprint: "f".into(),
            filename: "a.txt".into(),
            mime_type: "text/plain".into(),
            file_size: 5,
            text: "héllo".into(),
        };
        assert_eq!(doc.char_count(), 5);
    }
}
