//! OCR for scanned PDFs: pdftoppm renders pages, tesseract reads them.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use intake_core::{Error, Result};

use super::run_cmd_with_timeout;

/// Render resolution for OCR.
const OCR_DPI: u32 = 300;

/// Tesseract language pack.
const OCR_LANGUAGE: &str = "eng";

/// OCR every page of the PDF at `pdf_path`, joining pages with blank lines.
///
/// A page tesseract fails on is skipped with a warning.
pub async fn ocr_pdf(pdf_path: &Path, cmd_timeout_secs: u64) -> Result<String> {
    let img_dir = TempDir::new()
        .map_err(|e| Error::Extraction(format!("Failed to create temp dir: {}", e)))?;
    let img_prefix = img_dir.path().join("page");

    debug!(dpi = OCR_DPI, language = OCR_LANGUAGE, "Rendering PDF pages for OCR");

    // Rendering is slower than text extraction.
    run_cmd_with_timeout(
        Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(OCR_DPI.to_string())
            .arg(pdf_path)
            .arg(&img_prefix),
        cmd_timeout_secs * 3,
    )
    .await?;

    let mut page_images = Vec::new();
    let entries = fs::read_dir(img_dir.path())
        .map_err(|e| Error::Extraction(format!("Failed to read temp dir: {}", e)))?;
    for entry in entries {
        let path = entry
            .map_err(|e| Error::Extraction(format!("Failed to read dir entry: {}", e)))?
            .path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            page_images.push(path);
        }
    }
    // pdftoppm zero-pads page numbers, so name order is page order.
    page_images.sort();

    debug!(pages = page_images.len(), "OCRing rendered pages");

    let mut page_texts = Vec::with_capacity(page_images.len());
    for (i, image) in page_images.iter().enumerate() {
        // `tesseract IMAGE stdout` prints the recognized text.
        let result = run_cmd_with_timeout(
            Command::new("tesseract")
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(OCR_LANGUAGE),
            cmd_timeout_secs,
        )
        .await;

        match result {
            Ok(text) => page_texts.push(text),
            Err(e) => warn!(page = i + 1, error = %e, "OCR failed for page, skipping"),
        }
    }

    Ok(page_texts.join("\n\n"))
}
