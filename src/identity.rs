//! Deterministic chunk identities.
//!
//! A chunk's identity is a SHA-256 digest over its file key, its sequence
//! index and a SHA-256 fingerprint of its text. The same three inputs always
//! produce the same id, so re-ingesting unchanged content overwrites the
//! existing index entries instead of adding new ones.

use serde::Serialize;
use sha2::{Digest, Sha256};

const DOMAIN: &[u8] = b"chunk-identity/v1";

/// Vector index key for a chunk (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChunkIdentity(String);

impl ChunkIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChunkIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 of the chunk text, lowercase hex.
pub fn content_fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Derive the identity of chunk `chunk_index` of the file `file_key`.
///
/// The file key is length-prefixed and the fingerprint is fixed-width, so no
/// two distinct input triples share an encoding.
pub fn chunk_identity(file_key: &str, chunk_index: usize, text: &str) -> ChunkIdentity {
    let fingerprint = content_fingerprint(text);

    let mut hasher = Sha256::new();
    hasher.update((DOMAIN.len() as u64).to_le_bytes());
    hasher.update(DOMAIN);
    hasher.update((file_key.len() as u64).to_le_bytes());
    hasher.update(file_key.as_bytes());
    hasher.update((chunk_index as u64).to_le_bytes());
    hasher.update(fingerprint.as_bytes());

    ChunkIdentity(hex::encode(hasher.finalize()))
}
