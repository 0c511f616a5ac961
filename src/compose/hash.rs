//! Deterministic hashing for change detection.
//!
//! This module provides hashing of compose documents and rendered
//! templates, used for upload keys and for detecting that a re-render
//! produced an identical graph.

use sha2::{Digest, Sha256};

use super::spec::ComposeDocument;

/// Hasher for compose documents and rendered templates.
#[derive(Debug, Default)]
pub struct DocumentHasher;

impl DocumentHasher {
    /// Creates a new document hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the whole compose document.
    ///
    /// The document serializes with deterministic key order, so the hash
    /// is stable for a given input.
    #[must_use]
    pub fn hash_document(&self, document: &ComposeDocument) -> String {
        let serialized = serde_json::to_vec(document).unwrap_or_default();
        Self::hash_bytes(&serialized)
    }

    /// Computes a hash of a rendered template body.
    #[must_use]
    pub fn hash_template(&self, body: &str) -> String {
        Self::hash_bytes(body.as_bytes())
    }

    /// Hashes raw bytes to a hex digest.
    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}
