//! Plain-text extraction.

use async_trait::async_trait;

use intake_core::{Result, TextExtractor};

/// Reads bytes as UTF-8, replacing invalid sequences. A leading BOM is dropped.
pub struct TextNativeExtractor;

#[async_trait]
impl TextExtractor for TextNativeExtractor {
    async fn extract_text(&self, data: &[u8], _filename: &str, _mime_hint: &str) -> Result<String> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn name(&self) -> &str {
        "text_native"
    }
}
