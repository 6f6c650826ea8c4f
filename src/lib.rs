//! # Transcript Ingest
//!
//! Idempotent ingestion of program transcripts into a vector index.
//!
//! Each document's filename is mapped to typed program metadata, its text is
//! normalized and split into overlapping word windows, and each window gets
//! a deterministic identity. Windows are embedded and upserted in batches
//! keyed by that identity, so re-running over the same files overwrites
//! instead of duplicating. Every chunk attempted lands in a per-run CSV
//! audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ connector  │──▶│ map/normalize│──▶│  chunk   │──▶│ identity │
//! │    _fs     │   │              │   │          │   │          │
//! └────────────┘   └──────────────┘   └──────────┘   └────┬─────┘
//!                                                         ▼
//!                  ┌──────────┐   ┌──────────────┐   ┌──────────┐
//!                  │  audit   │◀──│ vector_index │◀──│embedding │
//!                  │  (CSV)   │   │   (upsert)   │   │ (batch)  │
//!                  └──────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tingest init-index                    # create the index if absent
//! tingest run --dry-run                 # list files and chunk counts
//! tingest run --path ./data/docs        # ingest
//! tingest inspect "Episode 269 2025.docx"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`connector_fs`] | Filesystem discovery |
//! | [`mapper`] | Filename → program metadata |
//! | [`extract`] | Docx / plain-text extraction |
//! | [`normalize`] | Text normalization |
//! | [`chunk`] | Overlapping word windows |
//! | [`identity`] | Deterministic chunk ids |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Vector index abstraction |
//! | [`ingest`] | Batched embed/upsert orchestration |
//! | [`audit`] | Per-run CSV audit log |
//! | [`cancel`] | Run cancellation |
//! | [`progress`] | Progress reporting |

pub mod audit;
pub mod cancel;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod identity;
pub mod ingest;
pub mod mapper;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod vector_index;
