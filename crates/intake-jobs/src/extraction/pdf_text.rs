//! PDF text extraction using `pdftotext` (poppler-utils), with an optional
//! OCR pass for scanned documents.

use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use intake_core::defaults::{ENV_OCR_ENABLED, EXTRACTION_CMD_TIMEOUT_SECS, OCR_MIN_TEXT_CHARS};
use intake_core::{Error, Result, TextExtractor};

use super::pdf_ocr::ocr_pdf;
use super::run_cmd_with_timeout;

/// Extracts the text layer of a PDF.
///
/// When OCR is enabled and the text layer is near-empty or `pdftotext` fails,
/// pages are rendered and recognized with tesseract instead.
pub struct PdfTextExtractor {
    ocr_enabled: bool,
    cmd_timeout_secs: u64,
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self {
            ocr_enabled: false,
            cmd_timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `OCR_ENABLED` (`true`/`1` enables the OCR fallback).
    pub fn from_env() -> Self {
        let ocr_enabled = std::env::var(ENV_OCR_ENABLED)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        Self::default().with_ocr(ocr_enabled)
    }

    pub fn with_ocr(mut self, enabled: bool) -> Self {
        self.ocr_enabled = enabled;
        self
    }

    pub fn with_cmd_timeout(mut self, secs: u64) -> Self {
        self.cmd_timeout_secs = secs;
        self
    }

    pub fn ocr_enabled(&self) -> bool {
        self.ocr_enabled
    }
}

/// Whether extracted text is too thin to be a real text layer.
pub(crate) fn needs_ocr(text: &str) -> bool {
    text.trim().chars().count() < OCR_MIN_TEXT_CHARS
}

/// Choose between the text layer and the OCR result.
///
/// OCR wins only with more text. When both fail the text layer error is kept.
fn pick_text(filename: &str, layer: Result<String>, ocr: Result<String>) -> Result<String> {
    match (layer, ocr) {
        (Ok(text), Ok(ocr_text)) if ocr_text.trim().len() > text.trim().len() => Ok(ocr_text),
        (Ok(text), Ok(_)) => Ok(text),
        (Ok(text), Err(e)) => {
            warn!(filename, error = %e, "OCR fallback failed, keeping text layer");
            Ok(text)
        }
        (Err(_), Ok(ocr_text)) if !ocr_text.trim().is_empty() => Ok(ocr_text),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(ocr_err)) => {
            warn!(filename, error = %ocr_err, "OCR fallback failed");
            Err(e)
        }
    }
}

fn validate_pdf(data: &[u8], filename: &str) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidInput(
            "Cannot extract text from empty PDF data".to_string(),
        ));
    }
    if !data.starts_with(b"%PDF") {
        return Err(Error::InvalidInput(format!(
            "File '{}' is not a valid PDF (missing %PDF header)",
            filename
        )));
    }
    Ok(())
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, data: &[u8], filename: &str, _mime_hint: &str) -> Result<String> {
        validate_pdf(data, filename)?;

        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Extraction(format!("Failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Extraction(format!("Failed to write temp file: {}", e)))?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        let layer = run_cmd_with_timeout(
            Command::new("pdftotext").arg("-layout").arg(&tmp_path).arg("-"),
            self.cmd_timeout_secs,
        )
        .await;

        let layer = match layer {
            Ok(text) if !needs_ocr(&text) => {
                debug!(filename, chars = text.len(), "Extracted PDF text layer");
                return Ok(text);
            }
            Ok(text) if !self.ocr_enabled => {
                debug!(filename, "PDF text layer is near-empty and OCR is disabled");
                return Ok(text);
            }
            Err(e) if !self.ocr_enabled => return Err(e),
            Ok(text) => {
                info!(filename, "PDF text layer is near-empty, falling back to OCR");
                Ok(text)
            }
            Err(e) => {
                warn!(filename, error = %e, "pdftotext failed, falling back to OCR");
                Err(e)
            }
        };

        let ocr = ocr_pdf(tmpfile.path(), self.cmd_timeout_secs).await;
        pick_text(filename, layer, ocr)
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_empty_data() {
        let err = PdfTextExtractor::new()
            .extract_text(b"", "empty.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rejects_non_pdf() {
        let err = PdfTextExtractor::new()
            .extract_text(b"plain text", "fake.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing %PDF header"));
    }

    #[test]
    fn test_needs_ocr_threshold() {
        assert!(needs_ocr(""));
        assert!(needs_ocr("   \n\x0c  "));
        assert!(needs_ocr(&"a".repeat(OCR_MIN_TEXT_CHARS - 1)));
        assert!(!needs_ocr(&"a".repeat(OCR_MIN_TEXT_CHARS)));
    }

    fn failed(msg: &str) -> Result<String> {
        Err(Error::Extraction(msg.to_string()))
    }

    #[test]
    fn test_pick_text_prefers_longer_ocr() {
        let text = pick_text("a.pdf", Ok(" x ".into()), Ok("scanned words".into())).unwrap();
        assert_eq!(text, "scanned words");
        let text = pick_text("a.pdf", Ok("layer text".into()), Ok("abc".into())).unwrap();
        assert_eq!(text, "layer text");
        let text = pick_text("a.pdf", Ok("thin".into()), failed("tesseract missing")).unwrap();
        assert_eq!(text, "thin");
    }

    #[test]
    fn test_pick_text_recovers_unreadable_pdf_with_ocr() {
        let text = pick_text("broken.pdf", failed("pdftotext: bad xref"), Ok("page one".into()));
        assert_eq!(text.unwrap(), "page one");
    }

    #[test]
    fn test_pick_text_keeps_parse_error_when_ocr_finds_nothing() {
        let err = pick_text("broken.pdf", failed("bad xref"), Ok("  \n".into())).unwrap_err();
        assert!(err.to_string().contains("bad xref"));
        let err = pick_text("broken.pdf", failed("bad xref"), failed("pdftoppm failed")).unwrap_err();
        assert!(err.to_string().contains("bad xref"));
    }

    #[test]
    fn test_builders() {
        let extractor = PdfTextExtractor::new().with_ocr(true).with_cmd_timeout(5);
        assert!(extractor.ocr_enabled());
        assert_eq!(extractor.cmd_timeout_secs, 5);
        assert!(!PdfTextExtractor::default().ocr_enabled());
    }
}
