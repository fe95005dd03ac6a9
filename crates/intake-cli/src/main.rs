//! `intake`: submit documents to the ingestion engine from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use intake_core::{content_fingerprint, DocumentStore, EmbeddingBackend, EntityExtractor, JobKind};
use intake_db::{Database, MemoryDocumentStore, PoolConfig};
use intake_inference::{
    MockEmbeddingBackend, MockEntityExtractor, OllamaConfig, OllamaEmbedder, OllamaEntityExtractor,
};
use intake_jobs::{
    EngineConfig, EngineHandle, ExtractionStrategy, ExtractorRouter, IngestionHandler, JobEngine,
    JobStatus, JobView, PdfTextExtractor,
};

#[derive(Parser, Debug)]
#[command(name = "intake", version, about = "Asynchronous document ingestion engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest files and print each job's final state as JSON.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Worker tasks (overrides JOB_WORKERS).
        #[arg(long)]
        workers: Option<usize>,

        /// Concurrently running jobs (overrides JOB_MAX_CONCURRENT).
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Submission queue capacity (overrides JOB_QUEUE_CAPACITY).
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// PostgreSQL URL. Documents are kept in memory when unset.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Pool size (default: one connection per concurrent job plus one).
        #[arg(long, env = "DB_MAX_CONNECTIONS")]
        db_max_connections: Option<u32>,

        /// OCR scanned PDFs without a text layer (overrides OCR_ENABLED).
        #[arg(long)]
        ocr: bool,

        /// Use deterministic local backends instead of Ollama.
        #[arg(long)]
        offline: bool,

        /// Seconds to wait for each job before giving up on it.
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Print the content fingerprint of a file.
    Fingerprint {
        path: PathBuf,
    },
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, daily rotation)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "intake=info,intake_jobs=info")
///
/// Console logs go to stderr so stdout carries only results.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "intake=info,intake_jobs=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("intake.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
        None
    } else {
        let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
        None
    }
}

/// The document store, plus the database when one is configured.
async fn document_store(
    database_url: Option<&str>,
    pool_config: &PoolConfig,
) -> anyhow::Result<(Arc<dyn DocumentStore>, Option<Database>)> {
    match database_url {
        Some(url) => {
            let db = Database::connect_with_config(url, pool_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            db.log_pool_health();
            info!(
                max_connections = pool_config.max_connections,
                "Using PostgreSQL document store"
            );
            Ok((Arc::new(db.documents.clone()), Some(db)))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory document store");
            Ok((Arc::new(MemoryDocumentStore::new()), None))
        }
    }
}

/// Pool sized to the engine unless overridden.
fn pool_config(engine: &EngineConfig, max_connections: Option<u32>) -> PoolConfig {
    let config = PoolConfig::for_concurrency(engine.max_concurrent);
    match max_connections {
        Some(n) => config.with_max_connections(n),
        None => config,
    }
}

type InferenceBackends = (Arc<dyn EntityExtractor>, Arc<dyn EmbeddingBackend>);

fn inference(offline: bool) -> anyhow::Result<InferenceBackends> {
    if offline {
        return Ok((
            Arc::new(MockEntityExtractor::new()),
            Arc::new(MockEmbeddingBackend::new()),
        ));
    }
    let config = OllamaConfig::from_env();
    let entities = OllamaEntityExtractor::new(config.clone())
        .context("Failed to build entity extractor")?;
    let embedder = OllamaEmbedder::new(config).context("Failed to build embedder")?;
    Ok((Arc::new(entities), Arc::new(embedder)))
}

/// Submit, retrying while the queue is full.
async fn submit_with_backoff(handle: &EngineHandle, path: &Path) -> anyhow::Result<Uuid> {
    let params = json!({
        "file_path": path,
        "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
    });
    loop {
        match handle.submit(JobKind::ProcessDocument.as_str(), params.clone()) {
            Ok(id) => return Ok(id),
            Err(e) if e.is_retryable() => tokio::time::sleep(Duration::from_millis(25)).await,
            Err(e) => return Err(e).context("Failed to submit job"),
        }
    }
}

async fn ingest(
    paths: Vec<PathBuf>,
    config: EngineConfig,
    database_url: Option<String>,
    db_max_connections: Option<u32>,
    ocr: bool,
    offline: bool,
    timeout: Duration,
) -> anyhow::Result<ExitCode> {
    let pool = pool_config(&config, db_max_connections);
    let (store, db) = document_store(database_url.as_deref(), &pool).await?;
    let (entities, embedder) = inference(offline)?;

    let mut router = ExtractorRouter::from_env();
    if ocr {
        router.register(
            ExtractionStrategy::PdfText,
            Arc::new(PdfTextExtractor::from_env().with_ocr(true)),
        );
    }
    let handler = IngestionHandler::new(Arc::new(router), entities, embedder, store);

    let mut engine = JobEngine::new(config);
    engine
        .registry_mut()
        .register_kind(JobKind::ProcessDocument, handler);
    engine.registry().ensure_registered(&JobKind::ALL)?;
    let handle = engine.start();

    let mut submitted = Vec::with_capacity(paths.len());
    for path in &paths {
        let id = submit_with_backoff(&handle, path).await?;
        submitted.push(id);
    }

    let mut failed = 0usize;
    for id in submitted {
        let view: JobView = handle
            .wait_for(id, Duration::from_millis(100), timeout)
            .await?;
        if view.status != JobStatus::Done {
            failed += 1;
        }
        println!("{}", serde_json::to_string(&view)?);
    }

    let report = handle.shutdown().await?;
    if report.aborted > 0 {
        warn!(aborted = report.aborted, "Workers aborted at shutdown");
    }
    if let Some(db) = &db {
        db.log_pool_health();
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest {
            paths,
            workers,
            max_concurrent,
            queue_capacity,
            database_url,
            db_max_connections,
            ocr,
            offline,
            timeout_secs,
        } => {
            let mut config = EngineConfig::from_env();
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            if let Some(max) = max_concurrent {
                config = config.with_max_concurrent(max);
            }
            if let Some(capacity) = queue_capacity {
                config = config.with_queue_capacity(capacity);
            }
            ingest(
                paths,
                config,
                database_url,
                db_max_connections,
                ocr,
                offline,
                Duration::from_secs(timeout_secs),
            )
            .await
        }
        Command::Fingerprint { path } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("{}  {}", content_fingerprint(&data), path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
