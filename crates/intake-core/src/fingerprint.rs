//! Content fingerprints used as the document deduplication key.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 content fingerprint of raw document bytes as lowercase hex.
///
/// Identical bytes always share a fingerprint regardless of filename.
pub fn content_fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check whether a string has the shape of a content fingerprint.
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == 64
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
