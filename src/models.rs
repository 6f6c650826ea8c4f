//! Core data models that flow through the ingestion pipeline.
//!
//! A [`SourceFile`] is read once per run, split into [`Chunk`]s, turned into
//! [`UpsertRecord`]s for the vector index, and accounted for with one
//! [`AuditRow`] per chunk attempted.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ParseError;
use crate::identity::ChunkIdentity;

/// Container formats the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Docx,
    PlainText,
}

impl DocumentKind {
    /// Detect the kind from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<DocumentKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(DocumentKind::Docx),
            "txt" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// A document read from disk. Immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Stable logical name: path relative to the ingest root, `/`-separated.
    pub key: String,
    pub filename: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, lowercase hex.
    pub content_hash: String,
    pub modified: DateTime<Utc>,
    pub kind: Option<DocumentKind>,
}

impl SourceFile {
    pub fn read(path: &Path, key: &str) -> Result<SourceFile, ParseError> {
        let io_err = |source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(io_err)?;
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| key.to_string());

        Ok(SourceFile::from_bytes(key, &filename, path, bytes, modified))
    }

    pub fn from_bytes(
        key: &str,
        filename: &str,
        path: &Path,
        bytes: Vec<u8>,
        modified: DateTime<Utc>,
    ) -> SourceFile {
        let content_hash = hex::encode(Sha256::digest(&bytes));
        SourceFile {
            key: key.to_string(),
            filename: filename.to_string(),
            kind: DocumentKind::from_path(Path::new(filename)),
            path: path.to_path_buf(),
            bytes,
            content_hash,
            modified,
        }
    }

    /// Filename without its extension.
    pub fn title(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }
}

/// An overlapping word window of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_key: String,
    pub index: usize,
    /// Word offset of the first word (inclusive).
    pub start_word: usize,
    /// Word offset past the last word (exclusive).
    pub end_word: usize,
    pub text: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }
}

/// One vector index entry. Built per batch and discarded after upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertRecord {
    pub id: ChunkIdentity,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

/// One line of the per-run audit log.
///
/// Field order is the CSV column order. File-level failures (the document
/// never produced chunks) leave the chunk columns empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRow {
    pub run_id: String,
    pub source_filename: String,
    pub chunk_index: Option<usize>,
    pub chunk_identity: Option<String>,
    pub word_count: usize,
    pub outcome: Outcome,
    pub batch_id: Option<String>,
    pub timestamp: String,
    pub detail: String,
}
