//! Document chunking for embedding generation.
//!
//! Documents are split into overlapping fixed-size windows before embedding.
//! Offsets are byte offsets into the original text and always fall on UTF-8
//! character boundaries.
//!
//! # Example
//!
//! ```rust
//! use intake_db::chunking::{Chunker, ChunkerConfig, SlidingWindowChunker};
//!
//! let chunker = SlidingWindowChunker::new(ChunkerConfig {
//!     max_chunk_size: 10,
//!     overlap: 2,
//! });
//! let chunks = chunker.chunk("The quick brown fox jumps");
//! assert_eq!(chunks[0].text, "The quick ");
//! assert_eq!(chunks[1].start_offset, 8);
//! ```

use intake_core::defaults::{CHARS_PER_TOKEN, CHUNK_OVERLAP, CHUNK_SIZE};

/// Configuration for chunking strategies.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in bytes.
    pub max_chunk_size: usize,
    /// Number of bytes to overlap between chunks (for context preservation).
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
        }
    }
}

/// A text chunk with position information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within the document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Starting byte offset in the original document.
    pub start_offset: usize,
    /// Ending byte offset in the original document.
    pub end_offset: usize,
}

impl Chunk {
    pub fn new(index: usize, text: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            index,
            text,
            start_offset,
            end_offset,
        }
    }

    /// Get the length of the chunk in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Rough token estimate (at least one token for non-empty text).
    pub fn token_estimate(&self) -> usize {
        if self.text.is_empty() {
            0
        } else {
            self.text.chars().count().div_ceil(CHARS_PER_TOKEN)
        }
    }
}

/// Common trait for all chunking strategies.
pub trait Chunker: Send + Sync {
    /// Chunk the given text into a list of chunks.
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// Get the configuration used by this chunker.
    fn config(&self) -> &ChunkerConfig;
}

/// Find UTF-8 safe boundary at or before the given position.
fn find_char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Find UTF-8 safe boundary at or after the given position.
fn find_char_boundary_after(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Fixed-size chunks with configurable overlap.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowChunker {
    config: ChunkerConfig,
}

impl SlidingWindowChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![];
        }

        let max = self.config.max_chunk_size.max(1);
        if text.len() <= max {
            return vec![Chunk::new(0, text.to_string(), 0, text.len())];
        }

        // overlap >= max would never advance
        let step_size = max.saturating_sub(self.config.overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = find_char_boundary_before(text, (start + max).min(text.len()));
            if end <= start {
                // window narrower than one character
                end = find_char_boundary_after(text, start + 1);
            }

            chunks.push(Chunk::new(
                chunks.len(),
                text[start..end].to_string(),
                start,
                end,
            ));

            if end >= text.len() {
                break;
            }

            start = find_char_boundary_after(text, start + step_size);
        }

        chunks
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize) -> SlidingWindowChunker {
        SlidingWindowChunker::new(ChunkerConfig {
            max_chunk_size: max,
            overlap,
        })
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(10, 2).chunk("").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(100, 10).chunk("short text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 10);
    }

    #[test]
    fn test_windows_overlap_and_cover_text() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker(10, 3).chunk(text);

        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].start_offset, 7);
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks.last().unwrap().end_offset, text.len());

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }
    }

    #[test]
    fn test_overlap_not_smaller_than_window_still_terminates() {
        let chunks = chunker(4, 10).chunk("abcdefgh");
        assert!(!chunks.is_empty());
        assert_eq!(chunks.last().unwrap().end_offset, 8);
    }

    #[test]
    fn test_multibyte_text_respects_char_boundaries() {
        let text = "ééééééééé";
        let chunks = chunker(5, 1).chunk(text);
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_offset));
            assert!(text.is_char_boundary(chunk.end_offset));
            assert!(!chunk.is_empty());
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn test_window_narrower_than_a_char_advances() {
        let text = "日本語";
        let chunks = chunker(1, 0).chunk(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "日");
        assert_eq!(chunks[2].text, "語");
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(Chunk::new(0, String::new(), 0, 0).token_estimate(), 0);
        assert_eq!(Chunk::new(0, "abc".into(), 0, 3).token_estimate(), 1);
        assert_eq!(Chunk::new(0, "abcdefghi".into(), 0, 9).token_estimate(), 3);
    }

    #[test]
    fn test_default_config_matches_defaults() {
        let chunker = SlidingWindowChunker::default();
        assert_eq!(chunker.config().max_chunk_size, CHUNK_SIZE);
        assert_eq!(chunker.config().overlap, CHUNK_OVERLAP);
    }
}
