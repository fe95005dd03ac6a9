//! Structured logging field names for intake.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), job completions |
//! | DEBUG | Decision points, stage transitions, config choices |
//! | TRACE | Per-item iteration (chunks, entities) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "db", "inference", "extraction", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "engine", "worker", "ingestion", "ollama", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type tag.
pub const JOB_TYPE: &str = "job_type";

/// Worker index within the pool.
pub const WORKER: &str = "worker";

/// Pipeline stage name.
pub const STAGE: &str = "stage";

/// Document UUID written by the pipeline.
pub const DOCUMENT_ID: &str = "document_id";

/// Content fingerprint of a document.
pub const FINGERPRINT: &str = "fingerprint";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of ids waiting in the submission queue.
pub const QUEUE_DEPTH: &str = "queue_depth";

/// Number of chunks embedded or stored.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of entities extracted or stored.
pub const ENTITY_COUNT: &str = "entity_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

/// Every field name above, for log pipelines that whitelist fields.
pub const ALL_FIELDS: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    JOB_ID,
    JOB_TYPE,
    WORKER,
    STAGE,
    DOCUMENT_ID,
    FINGERPRINT,
    DURATION_MS,
    QUEUE_DEPTH,
    CHUNK_COUNT,
    ENTITY_COUNT,
    ERROR_MSG,
    SLOW,
];
