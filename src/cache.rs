//! Content hashing for build contexts.
//!
//! Uses SHA256 over sorted relative paths and file contents, so the digest
//! only changes when the staged inputs actually change.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Incremental digest over the entries of a build context.
pub struct ContextHasher {
    hasher: Sha256,
}

impl Default for ContextHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Add one entry. Path and content are length-prefixed so that
    /// different splits of the same bytes hash differently.
    pub fn add_entry(&mut self, rel_path: &str, content: &[u8]) {
        self.hasher.update((rel_path.len() as u64).to_le_bytes());
        self.hasher.update(rel_path.as_bytes());
        self.hasher.update((content.len() as u64).to_le_bytes());
        self.hasher.update(content);
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// SHA256 of a single file. Returns None if the file can't be read.
pub fn hash_file(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(content) => Some(format!("{:x}", Sha256::digest(&content))),
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to read {} for hashing: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// First 12 hex characters, for display.
pub fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}
