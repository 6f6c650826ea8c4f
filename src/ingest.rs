//! Ingestion pipeline orchestration.
//!
//! Coordinates the full run: discovery → read → filename mapping →
//! normalization → chunking → identity → batched embed → upsert → audit.
//!
//! Files are processed by a bounded pool of tokio tasks. Within a file,
//! batches run sequentially in chunk order. A failing batch is retried for
//! transient provider errors, then recorded and skipped; it never stops its
//! siblings or other files. Idempotency comes from upserting by
//! [`ChunkIdentity`]: nothing is looked up before writing.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audit::{self, AuditLog};
use crate::cancel::CancelToken;
use crate::chunk::Chunker;
use crate::config::{Config, RetryConfig};
use crate::connector_fs::{self, DocumentPath};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{BatchError, BatchStage, ProviderError};
use crate::identity::{chunk_identity, ChunkIdentity};
use crate::mapper::{self, ProgramMetadata};
use crate::models::{AuditRow, Chunk, Outcome, SourceFile, UpsertRecord};
use crate::normalize;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, ProgressMode};
use crate::vector_index::{self, IndexSpec, VectorIndex};

pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Exponential backoff without jitter: `initial · 2^(retry-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunker: Chunker,
    pub batch_size: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            chunker: config.chunker()?,
            batch_size: config.ingest.batch_size.max(1),
            concurrency: config.ingest.concurrency.max(1),
            retry: RetryPolicy::from_config(&config.retry),
        })
    }
}

/// How a single file ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Every chunk was upserted.
    Ingested,
    /// Some chunks were upserted but not all, because batches failed or the
    /// run was cancelled mid-file.
    Partial,
    /// Unreadable or unparseable, or every batch failed.
    Failed,
    /// Normalized to zero words.
    Empty,
    /// Cancelled before any batch was started.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub key: String,
    pub metadata: Option<ProgramMetadata>,
    pub status: FileStatus,
    pub chunks_total: usize,
    pub chunks_upserted: usize,
    pub chunks_failed: usize,
    pub batches_failed: usize,
    pub error: Option<String>,
}

impl FileReport {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            metadata: None,
            status: FileStatus::Ingested,
            chunks_total: 0,
            chunks_upserted: 0,
            chunks_failed: 0,
            batches_failed: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub files_seen: usize,
    pub files_ingested: usize,
    pub files_partial: usize,
    pub files_failed: usize,
    pub files_empty: usize,
    pub files_skipped: usize,
    pub chunks_upserted: usize,
    pub chunks_failed: usize,
    pub batches_failed: usize,
    pub cancelled: bool,
    pub audit_path: Option<PathBuf>,
}

impl RunSummary {
    fn record(&mut self, report: &FileReport) {
        match report.status {
            FileStatus::Ingested => self.files_ingested += 1,
            FileStatus::Partial => self.files_partial += 1,
            FileStatus::Failed => self.files_failed += 1,
            FileStatus::Empty => self.files_empty += 1,
            FileStatus::Cancelled => self.files_skipped += 1,
        }
        self.chunks_upserted += report.chunks_upserted;
        self.chunks_failed += report.chunks_failed;
        self.batches_failed += report.batches_failed;
    }
}

/// Shared run state. Cloning is cheap; every worker task holds a clone.
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    audit: Arc<AuditLog>,
    progress: Arc<dyn IngestProgressReporter>,
    run_id: Arc<str>,
    batch_counter: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        audit: Arc<AuditLog>,
        run_id: &str,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            embedder,
            index,
            audit,
            progress: Arc::new(NoProgress),
            run_id: Arc::from(run_id),
            batch_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Ingest `files` with bounded concurrency. Joins every spawned task
    /// before returning.
    pub async fn run(&self, files: Vec<DocumentPath>, cancel: CancelToken) -> RunSummary {
        let total = files.len();
        let mut summary = RunSummary {
            run_id: self.run_id.to_string(),
            files_seen: total,
            audit_path: Some(self.audit.path().to_path_buf()),
            ..RunSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut tasks = JoinSet::new();
        let mut started = 0usize;
        let mut done = 0u64;

        for doc in files {
            if cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let pipeline = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.ingest_file(&doc, &cancel).await
            });
            started += 1;

            while let Some(joined) = tasks.try_join_next() {
                done += 1;
                self.finish_task(joined, &mut summary, done, total);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            done += 1;
            self.finish_task(joined, &mut summary, done, total);
        }

        summary.files_skipped += total - started;
        summary.cancelled = cancel.is_cancelled();
        tracing::info!(
            run_id = %summary.run_id,
            files = summary.files_seen,
            upserted = summary.chunks_upserted,
            failed = summary.chunks_failed,
            "run finished"
        );
        summary
    }

    fn finish_task(
        &self,
        joined: Result<FileReport, tokio::task::JoinError>,
        summary: &mut RunSummary,
        done: u64,
        total: usize,
    ) {
        match joined {
            Ok(report) => {
                summary.record(&report);
                self.progress.report(IngestProgressEvent::Ingesting {
                    file: report.key,
                    n: done,
                    total: total as u64,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "ingest task failed");
                summary.files_failed += 1;
            }
        }
    }

    /// Ingest one file end to end. Never panics on bad input; every failure
    /// is reported and audited.
    pub async fn ingest_file(&self, doc: &DocumentPath, cancel: &CancelToken) -> FileReport {
        let mut report = FileReport::new(&doc.key);
        if cancel.is_cancelled() {
            report.status = FileStatus::Cancelled;
            return report;
        }

        let source = match SourceFile::read(&doc.path, &doc.key) {
            Ok(source) => source,
            Err(e) => return self.file_failure(report, &doc.key, e.to_string()),
        };

        let metadata = mapper::map_filename(&source.filename);
        report.metadata = Some(metadata.clone());

        let text = match normalize::normalize_document(&source.bytes, source.kind) {
            Ok(text) => text,
            Err(e) => return self.file_failure(report, &source.filename, e.to_string()),
        };

        let sequence = self.settings.chunker.split(&source.key, &text);
        report.chunks_total = sequence.len();
        if sequence.is_empty() {
            tracing::warn!(file = %source.key, "document has no words, nothing to ingest");
            report.status = FileStatus::Empty;
            return report;
        }
        tracing::info!(
            file = %source.key,
            program = metadata.program(),
            words = sequence.word_count(),
            chunks = report.chunks_total,
            "ingesting"
        );

        let program_fields = metadata.to_metadata();
        let ingested_at = chrono::Utc::now().timestamp();
        let mut chunks = sequence.iter();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let batch: Vec<Chunk> = chunks.by_ref().take(self.settings.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            match self
                .process_batch(&source, &program_fields, ingested_at, batch, cancel)
                .await
            {
                Ok(()) => report.chunks_upserted += batch_len,
                Err(e) => {
                    tracing::error!(file = %source.key, error = %e, "batch failed");
                    report.chunks_failed += batch_len;
                    report.batches_failed += 1;
                    report.error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        report.status = if report.chunks_upserted == report.chunks_total {
            FileStatus::Ingested
        } else if report.chunks_upserted > 0 {
            FileStatus::Partial
        } else if report.batches_failed > 0 {
            FileStatus::Failed
        } else {
            FileStatus::Cancelled
        };
        report
    }

    fn file_failure(&self, mut report: FileReport, filename: &str, detail: String) -> FileReport {
        tracing::error!(file = %report.key, error = %detail, "file failed");
        self.write_audit(&[AuditRow {
            run_id: self.run_id.to_string(),
            source_filename: filename.to_string(),
            chunk_index: None,
            chunk_identity: None,
            word_count: 0,
            outcome: Outcome::Failure,
            batch_id: None,
            timestamp: audit::timestamp_now(),
            detail: detail.clone(),
        }]);
        report.status = FileStatus::Failed;
        report.error = Some(detail);
        report
    }

    /// Embed and upsert one batch, then audit every chunk in it.
    async fn process_batch(
        &self,
        source: &SourceFile,
        program_fields: &Map<String, Value>,
        ingested_at: i64,
        batch: Vec<Chunk>,
        cancel: &CancelToken,
    ) -> Result<(), BatchError> {
        let batch_id = format!("b{:05}", self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1);
        let ids: Vec<ChunkIdentity> = batch
            .iter()
            .map(|c| chunk_identity(&source.key, c.index, &c.text))
            .collect();

        let result = self
            .embed_and_upsert(source, program_fields, ingested_at, &batch, &ids, &batch_id, cancel)
            .await;

        let timestamp = audit::timestamp_now();
        let (outcome, detail) = match &result {
            Ok(()) => (Outcome::Success, String::new()),
            Err(e) => (Outcome::Failure, e.to_string()),
        };
        let rows: Vec<AuditRow> = batch
            .iter()
            .zip(&ids)
            .map(|(chunk, id)| AuditRow {
                run_id: self.run_id.to_string(),
                source_filename: source.filename.clone(),
                chunk_index: Some(chunk.index),
                chunk_identity: Some(id.to_string()),
                word_count: chunk.word_count(),
                outcome,
                batch_id: Some(batch_id.clone()),
                timestamp: timestamp.clone(),
                detail: detail.clone(),
            })
            .collect();
        self.write_audit(&rows);

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn embed_and_upsert(
        &self,
        source: &SourceFile,
        program_fields: &Map<String, Value>,
        ingested_at: i64,
        batch: &[Chunk],
        ids: &[ChunkIdentity],
        batch_id: &str,
        cancel: &CancelToken,
    ) -> Result<(), BatchError> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let embedder = self.embedder.as_ref();
        let inputs = texts.as_slice();
        let (vectors, attempts) = self
            .with_retry(BatchStage::Embed, batch_id, cancel, move || {
                embedder.embed(inputs)
            })
            .await?;
        self.check_vectors(&vectors, batch.len())
            .map_err(|source| BatchError {
                batch_id: batch_id.to_string(),
                stage: BatchStage::Embed,
                attempts,
                source,
            })?;

        let records: Vec<UpsertRecord> = batch
            .iter()
            .zip(ids)
            .zip(vectors)
            .map(|((chunk, id), values)| UpsertRecord {
                id: id.clone(),
                values,
                metadata: build_metadata(source, program_fields, chunk, ingested_at),
            })
            .collect();

        let index = self.index.as_ref();
        let records = records.as_slice();
        self.with_retry(BatchStage::Upsert, batch_id, cancel, move || {
            index.upsert(records)
        })
        .await?;

        tracing::debug!(file = %source.key, batch = batch_id, chunks = batch.len(), "batch upserted");
        Ok(())
    }

    fn check_vectors(&self, vectors: &[Vec<f32>], expected: usize) -> Result<(), ProviderError> {
        if vectors.len() != expected {
            return Err(ProviderError::InvalidResponse {
                service: "embedding",
                message: format!("expected {} vectors, got {}", expected, vectors.len()),
            });
        }
        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(ProviderError::InvalidResponse {
                service: "embedding",
                message: format!("expected {} dimensions, got {}", dims, bad.len()),
            });
        }
        Ok(())
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs
    /// out of retries, or the run is cancelled during a backoff.
    async fn with_retry<T, F, Fut>(
        &self,
        stage: BatchStage,
        batch_id: &str,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<(T, u32), BatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let policy = self.settings.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            let give_up = |source| BatchError {
                batch_id: batch_id.to_string(),
                stage,
                attempts: attempt,
                source,
            };
            if !err.is_retryable() || attempt > policy.max_retries || cancel.is_cancelled() {
                return Err(give_up(err));
            }

            let delay = policy.delay(attempt);
            tracing::warn!(
                batch = batch_id,
                %stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(give_up(err)),
            }
        }
    }

    fn write_audit(&self, rows: &[AuditRow]) {
        if let Err(e) = self.audit.append(rows) {
            tracing::error!(path = %self.audit.path().display(), error = %e, "failed to write audit rows");
        }
    }
}

/// Program fields plus the universal per-chunk fields. Values are flat
/// scalars only.
pub fn build_metadata(
    source: &SourceFile,
    program_fields: &Map<String, Value>,
    chunk: &Chunk,
    ingested_at: i64,
) -> Map<String, Value> {
    let mut metadata = program_fields.clone();
    metadata.insert("source_file".into(), Value::from(source.filename.as_str()));
    metadata.insert("source_path".into(), Value::from(source.key.as_str()));
    metadata.insert("title".into(), Value::from(source.title()));
    metadata.insert("source_sha".into(), Value::from(source.content_hash.as_str()));
    metadata.insert("chunk_index".into(), Value::from(chunk.index as u64));
    metadata.insert("chunk_start_word".into(), Value::from(chunk.start_word as u64));
    metadata.insert("chunk_end_word".into(), Value::from(chunk.end_word as u64));
    metadata.insert("word_count".into(), Value::from(chunk.word_count() as u64));
    metadata.insert("ingested_at".into(), Value::from(ingested_at));
    metadata.insert("text".into(), Value::from(chunk.text.as_str()));
    metadata.insert("schema_version".into(), Value::from(METADATA_SCHEMA_VERSION));
    metadata
}

/// Options for `tingest run`, layered over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub path: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub progress: Option<ProgressMode>,
}

/// Apply CLI overrides and re-validate.
pub fn apply_overrides(config: &Config, opts: &RunOptions) -> Result<Config> {
    let mut config = config.clone();
    if let Some(path) = &opts.path {
        config.ingest.root = path.clone();
    }
    if let Some(n) = opts.batch_size {
        config.ingest.batch_size = n;
    }
    if let Some(n) = opts.concurrency {
        config.ingest.concurrency = n;
    }
    config.validate()?;
    Ok(config)
}

/// Entry point for `tingest run`.
pub async fn run_ingest(config: &Config, opts: RunOptions, cancel: CancelToken) -> Result<()> {
    let config = apply_overrides(config, &opts)?;
    let progress: Arc<dyn IngestProgressReporter> = Arc::from(
        opts.progress
            .unwrap_or_else(ProgressMode::default_for_tty)
            .reporter(),
    );

    progress.report(IngestProgressEvent::Discovering {
        root: config.ingest.root.display().to_string(),
    });
    let mut docs = connector_fs::scan_documents(&config.ingest, &config.ingest.root)?;
    if let Some(limit) = opts.limit {
        docs.truncate(limit);
    }

    if opts.dry_run {
        return dry_run(&config, &docs);
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding] provider or use --dry-run");
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(embedding::create_provider(&config.embedding)?);
    let index: Arc<dyn VectorIndex> = Arc::from(vector_index::create_index(&config.index)?);
    index
        .ensure_index(&IndexSpec {
            name: config.index.name.clone(),
            dimension: embedder.dims(),
            metric: config.index.metric,
        })
        .await?;

    let run_id = audit::new_run_id();
    let audit_log = Arc::new(AuditLog::create(&config.ingest.audit_dir, &run_id)?);
    let pipeline = Pipeline::new(
        PipelineSettings::from_config(&config)?,
        embedder,
        index,
        audit_log,
        &run_id,
    )
    .with_progress(progress);

    let summary = pipeline.run(docs, cancel).await;
    print_summary(&summary);
    Ok(())
}

fn dry_run(config: &Config, docs: &[DocumentPath]) -> Result<()> {
    let chunker = config.chunker()?;
    println!("run (dry-run)");
    println!("  files found: {}", docs.len());
    let mut total_chunks = 0usize;
    for doc in docs {
        let line = match SourceFile::read(&doc.path, &doc.key) {
            Ok(source) => {
                let program = mapper::map_filename(&source.filename).program();
                match normalize::normalize_document(&source.bytes, source.kind) {
                    Ok(text) => {
                        let chunks = chunker.split(&source.key, &text).len();
                        total_chunks += chunks;
                        format!("{:<9} {:>5} chunks  {}", program, chunks, doc.key)
                    }
                    Err(e) => format!("{:<9}  error  {}: {}", program, doc.key, e),
                }
            }
            Err(e) => format!("{:<9}  error  {}: {}", "-", doc.key, e),
        };
        println!("  {}", line);
    }
    println!("  estimated chunks: {}", total_chunks);
    Ok(())
}

pub fn print_summary(summary: &RunSummary) {
    let state = if summary.cancelled { "cancelled" } else { "ok" };
    println!("run {} {}", summary.run_id, state);
    println!(
        "  files: {} seen, {} ingested, {} partial, {} failed, {} empty, {} skipped",
        summary.files_seen,
        summary.files_ingested,
        summary.files_partial,
        summary.files_failed,
        summary.files_empty,
        summary.files_skipped
    );
    println!(
        "  chunks: {} upserted, {} failed",
        summary.chunks_upserted, summary.chunks_failed
    );
    println!("  batches failed: {}", summary.batches_failed);
    if let Some(path) = &summary.audit_path {
        println!("  audit: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::Path;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(20_000),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_millis(8000));
        assert_eq!(policy.delay(6), Duration::from_millis(20_000));
        assert_eq!(policy.delay(40), Duration::from_millis(20_000));
    }

    #[test]
    fn metadata_merges_program_and_universal_fields() {
        let source = SourceFile::from_bytes(
            "podcast/Episode 3 2024.docx",
            "Episode 3 2024.docx",
            Path::new("/data/podcast/Episode 3 2024.docx"),
            b"bytes".to_vec(),
            Utc::now(),
        );
        let program = mapper::map_filename(&source.filename).to_metadata();
        let chunk = Chunk {
            source_key: source.key.clone(),
            index: 2,
            start_word: 800,
            end_word: 1200,
            text: "hello".into(),
        };
        let md = build_metadata(&source, &program, &chunk, 1_700_000_000);

        assert_eq!(md["program"], "Podcast");
        assert_eq!(md["episode_number"], 3);
        assert_eq!(md["source_file"], "Episode 3 2024.docx");
        assert_eq!(md["source_path"], "podcast/Episode 3 2024.docx");
        assert_eq!(md["title"], "Episode 3 2024");
        assert_eq!(md["chunk_index"], 2);
        assert_eq!(md["word_count"], 400);
        assert_eq!(md["ingested_at"], 1_700_000_000i64);
        assert_eq!(md["schema_version"], 1);
        assert!(md.values().all(|v| v.is_string() || v.is_number() || v.is_boolean()));
    }

    #[test]
    fn overrides_beat_config_and_are_validated() {
        let config = Config::default();
        let opts = RunOptions {
            batch_size: Some(7),
            path: Some(PathBuf::from("/tmp/docs")),
            ..RunOptions::default()
        };
        let merged = apply_overrides(&config, &opts).unwrap();
        assert_eq!(merged.ingest.batch_size, 7);
        assert_eq!(merged.ingest.root, PathBuf::from("/tmp/docs"));
        assert_eq!(merged.ingest.concurrency, config.ingest.concurrency);

        let bad = RunOptions {
            concurrency: Some(0),
            ..RunOptions::default()
        };
        assert!(apply_overrides(&config, &bad).is_err());
    }
}
