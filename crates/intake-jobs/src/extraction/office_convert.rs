//! Office documents (docx, odt, rtf, epub) converted to plain text with pandoc.

use std::io::Write;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use intake_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use intake_core::{Error, Result, TextExtractor};

use super::run_cmd_with_timeout;

pub(crate) const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Zip local file header; docx, odt and epub are zip containers.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Pandoc input format for a MIME type.
pub(crate) fn pandoc_format(mime: &str) -> Option<&'static str> {
    match mime {
        DOCX_MIME => Some("docx"),
        "application/vnd.oasis.opendocument.text" => Some("odt"),
        "application/rtf" | "text/rtf" => Some("rtf"),
        "application/epub+zip" => Some("epub"),
        _ => None,
    }
}

fn is_zip_format(format: &str) -> bool {
    matches!(format, "docx" | "odt" | "epub")
}

/// Converts word-processor documents with `pandoc -t plain`.
pub struct OfficeConvertExtractor {
    cmd_timeout_secs: u64,
}

impl Default for OfficeConvertExtractor {
    fn default() -> Self {
        Self {
            cmd_timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }
}

impl OfficeConvertExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cmd_timeout(mut self, secs: u64) -> Self {
        self.cmd_timeout_secs = secs;
        self
    }
}

#[async_trait]
impl TextExtractor for OfficeConvertExtractor {
    async fn extract_text(&self, data: &[u8], filename: &str, mime_hint: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Cannot convert empty document '{}'",
                filename
            )));
        }
        let format = pandoc_format(mime_hint).ok_or_else(|| {
            Error::Extraction(format!("No office converter for '{}': {}", filename, mime_hint))
        })?;
        if is_zip_format(format) && !data.starts_with(ZIP_MAGIC) {
            return Err(Error::InvalidInput(format!(
                "File '{}' is not a valid {} document (not a zip archive)",
                filename, format
            )));
        }

        // pandoc picks readers by flag, the suffix only helps its error messages.
        let mut tmpfile = tempfile::Builder::new()
            .suffix(&format!(".{}", format))
            .tempfile()
            .map_err(|e| Error::Extraction(format!("Failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Extraction(format!("Failed to write temp file: {}", e)))?;

        debug!(filename, format, "Converting with pandoc");

        run_cmd_with_timeout(
            Command::new("pandoc")
                .arg("-f")
                .arg(format)
                .arg("-t")
                .arg("plain")
                .arg("--wrap=none")
                .arg(tmpfile.path()),
            self.cmd_timeout_secs,
        )
        .await
    }

    fn name(&self) -> &str {
        "office_convert"
    }
}
