//! Content hashes for duplicate detection across variants.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// SHA-256 hex digest of an artifact's final bytes.
pub fn content_hash(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Remembers which variant first produced each hash.
#[derive(Debug, Default)]
pub struct UniquenessTracker {
    seen: HashMap<String, u32>,
}

impl UniquenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash` for variant `index`; returns the earlier index on collision.
    pub fn record(&mut self, hash: &str, index: u32) -> Option<u32> {
        match self.seen.get(hash) {
            Some(&first) => Some(first),
            None => {
                self.seen.insert(hash.to_string(), index);
                None
            }
        }
    }
}
