//! TOML configuration.
//!
//! Every section is optional; missing values fall back to the defaults
//! below. [`load_config`] validates the result, and any [`ConfigError`]
//! aborts the run before a single file is touched. Secrets are never read
//! from the file: `OPENAI_API_KEY` and `PINECONE_API_KEY` come from the
//! environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::chunk::{Chunker, DEFAULT_OVERLAP_WORDS, DEFAULT_WINDOW_WORDS};
use crate::error::ConfigError;
use crate::vector_index::Metric;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_words")]
    pub window_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

fn default_window_words() -> usize {
    DEFAULT_WINDOW_WORDS
}
fn default_overlap_words() -> usize {
    DEFAULT_OVERLAP_WORDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            audit_dir: default_audit_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data/docs")
}
fn default_batch_size() -> usize {
    100
}
fn default_concurrency() -> usize {
    4
}
fn default_audit_dir() -> PathBuf {
    PathBuf::from("./runs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.docx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> Option<String> {
    Some("text-embedding-3-large".to_string())
}
fn default_dims() -> Option<usize> {
    Some(3072)
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    20_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Data-plane host. Resolved from the control plane when unset.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            name: default_index_name(),
            metric: Metric::default(),
            cloud: default_cloud(),
            region: default_region(),
            host: None,
            namespace: None,
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_provider() -> String {
    "pinecone".to_string()
}
fn default_index_name() -> String {
    "transcripts".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_api_url() -> String {
    "https://api.pinecone.io".to_string()
}

impl Config {
    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Chunker::new(self.chunking.window_words, self.chunking.overlap_words)?;

        if self.ingest.batch_size == 0 {
            return Err(ConfigError::invalid("ingest.batch_size must be > 0"));
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::invalid("ingest.concurrency must be > 0"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms must be <= retry.max_backoff_ms",
            ));
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "hash" => {}
            other => {
                return Err(ConfigError::invalid(format!(
                    "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hash.",
                    other
                )))
            }
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                return Err(ConfigError::invalid(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                )));
            }
            if self.embedding.model.is_none() && self.embedding.provider != "hash" {
                return Err(ConfigError::invalid(format!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                )));
            }
        }

        match self.index.provider.as_str() {
            "pinecone" | "memory" => {}
            other => {
                return Err(ConfigError::invalid(format!(
                    "Unknown index provider: '{}'. Must be pinecone or memory.",
                    other
                )))
            }
        }
        if self.index.name.trim().is_empty() {
            return Err(ConfigError::invalid("index.name must not be empty"));
        }

        Ok(())
    }

    pub fn chunker(&self) -> Result<Chunker, ConfigError> {
        Chunker::new(self.chunking.window_words, self.chunking.overlap_words)
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.window_words, 500);
        assert_eq!(cfg.chunking.overlap_words, 100);
        assert_eq!(cfg.ingest.batch_size, 100);
        assert_eq!(cfg.ingest.concurrency, 4);
        assert_eq!(cfg.ingest.include_globs, vec!["**/*.docx".to_string()]);
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.embedding.dims, Some(3072));
        assert_eq!(cfg.index.metric, Metric::Cosine);
        assert_eq!(cfg.index.name, "transcripts");
    }

    #[test]
    fn overlap_not_below_window_is_rejected() {
        let err = parse_config("[chunking]\nwindow_words = 100\noverlap_words = 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("overlap_words"));
    }

    #[test]
    fn zero_batch_size_and_concurrency_rejected() {
        assert!(parse_config("[ingest]\nbatch_size = 0\n").is_err());
        assert!(parse_config("[ingest]\nconcurrency = 0\n").is_err());
    }

    #[test]
    fn unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[index]\nprovider = \"sqlite\"\n").is_err());
    }

    #[test]
    fn hash_provider_needs_no_model() {
        let cfg = parse_config(
            "[embedding]\nprovider = \"hash\"\nmodel = \"unused\"\ndims = 8\n[index]\nprovider = \"memory\"\nmetric = \"dotproduct\"\n",
        )
        .unwrap();
        assert_eq!(cfg.embedding.dims, Some(8));
        assert_eq!(cfg.index.metric, Metric::DotProduct);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse_config("[chunking\nwindow_words = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
