//! Text extraction: content sniffing and dispatch to format adapters.

mod office_convert;
mod pdf_ocr;
mod pdf_text;
mod text_native;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use intake_core::{Error, Result, TextExtractor};

pub use office_convert::OfficeConvertExtractor;
pub use pdf_ocr::ocr_pdf;
pub use pdf_text::PdfTextExtractor;
pub use text_native::TextNativeExtractor;

/// Which adapter handles a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionStrategy {
    TextNative,
    PdfText,
    OfficeConvert,
}

/// MIME types without magic bytes that are read as text.
const TEXT_LIKE_MIME: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "application/javascript",
    "application/x-sh",
];

fn mime_from_extension(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "docx" => office_convert::DOCX_MIME,
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "epub" => "application/epub+zip",
        _ => return None,
    };
    Some(mime)
}

/// Detect the content type from magic bytes, then the file extension, then
/// the caller's hint.
pub fn detect_mime(filename: &str, data: &[u8], hint: &str) -> String {
    if let Some(kind) = infer::get(data) {
        // Office containers can sniff as a bare zip; the extension is more specific.
        if kind.mime_type() == "application/zip" {
            if let Some(mime) = mime_from_extension(filename) {
                return mime.to_string();
            }
        }
        return kind.mime_type().to_string();
    }
    if let Some(mime) = mime_from_extension(filename) {
        return mime.to_string();
    }
    hint.to_string()
}

/// Pick an extraction strategy for detected content.
pub fn strategy_for(mime: &str, data: &[u8]) -> Option<ExtractionStrategy> {
    if mime == "application/pdf" {
        return Some(ExtractionStrategy::PdfText);
    }
    if office_convert::pandoc_format(mime).is_some() {
        return Some(ExtractionStrategy::OfficeConvert);
    }
    if mime.starts_with("text/") || TEXT_LIKE_MIME.contains(&mime) {
        return Some(ExtractionStrategy::TextNative);
    }
    // Unknown binary claims: accept only if the bytes are valid UTF-8.
    if infer::get(data).is_none() && std::str::from_utf8(data).is_ok() {
        return Some(ExtractionStrategy::TextNative);
    }
    None
}

/// Run a command with a timeout, returning stdout as a string.
///
/// The child is killed if the timeout drops it.
pub(crate) async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!("External command timed out after {}s", timeout_secs))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Text extractor dispatching to per-format adapters.
pub struct ExtractorRouter {
    extractors: HashMap<ExtractionStrategy, Arc<dyn TextExtractor>>,
}

impl ExtractorRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Router with the plain-text, PDF and office adapters, OCR per `OCR_ENABLED`.
    pub fn from_env() -> Self {
        let mut router = Self::new();
        router.register(ExtractionStrategy::TextNative, Arc::new(TextNativeExtractor));
        router.register(ExtractionStrategy::PdfText, Arc::new(PdfTextExtractor::from_env()));
        router.register(ExtractionStrategy::OfficeConvert, Arc::new(OfficeConvertExtractor::new()));
        router
    }

    /// Register an adapter. Replaces any existing adapter for the same strategy.
    pub fn register(&mut self, strategy: ExtractionStrategy, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(strategy, extractor);
    }

    /// Check if an adapter is registered for the given strategy.
    pub fn has_adapter(&self, strategy: ExtractionStrategy) -> bool {
        self.extractors.contains_key(&strategy)
    }

    /// List all strategies that have registered adapters.
    pub fn available_strategies(&self) -> Vec<ExtractionStrategy> {
        self.extractors.keys().copied().collect()
    }
}

impl Default for ExtractorRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for ExtractorRouter {
    async fn extract_text(&self, data: &[u8], filename: &str, mime_hint: &str) -> Result<String> {
        let mime = detect_mime(filename, data, mime_hint);
        let strategy = strategy_for(&mime, data).ok_or_else(|| {
            Error::Extraction(format!("Unsupported content type for '{}': {}", filename, mime))
        })?;

        let extractor = self.extractors.get(&strategy).ok_or_else(|| {
            Error::Extraction(format!(
                "No extraction adapter registered for strategy: {:?}",
                strategy
            ))
        })?;

        debug!(filename, mime = %mime, ?strategy, extractor = extractor.name(), "Extracting text");
        extractor.extract_text(data, filename, &mime).await
    }

    fn name(&self) -> &str {
        "router"
    }
}
