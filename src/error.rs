//! Error taxonomy for the ingestion pipeline.
//!
//! Only [`ConfigError`] aborts a run. Everything else is isolated to the
//! file or batch that raised it and recorded in the audit log.

use std::path::PathBuf;

use thiserror::Error;

/// A filename token matched a rule but could not be converted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("{rule}: token '{token}' for {field} is not a valid number")]
    InvalidNumber {
        rule: &'static str,
        field: &'static str,
        token: String,
    },
}

/// The document container could not be turned into text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported document type: {0}")]
    UnsupportedKind(String),
    #[error("corrupt document container: {0}")]
    Container(String),
    #[error("malformed document XML: {0}")]
    Xml(String),
}

/// Failure talking to the embedding provider or the vector index.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
    #[error("{0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Rate limits, server errors and transport failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Transport { .. } => true,
            ProviderError::InvalidResponse { .. } | ProviderError::Unavailable(_) => false,
        }
    }

    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        ProviderError::Transport {
            service,
            message: err.to_string(),
        }
    }
}

/// Which half of a batch round-trip failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Embed,
    Upsert,
}

impl std::fmt::Display for BatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStage::Embed => write!(f, "embed"),
            BatchStage::Upsert => write!(f, "upsert"),
        }
    }
}

/// A batch gave up after exhausting its retries.
#[derive(Debug, Error)]
#[error("batch {batch_id} failed at {stage} after {attempts} attempt(s): {source}")]
pub struct BatchError {
    pub batch_id: String,
    pub stage: BatchStage,
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// Invalid configuration. Fatal before any file is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let status = |status| ProviderError::Status {
            service: "openai",
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(ProviderError::Transport {
            service: "pinecone",
            message: "connection reset".into()
        }
        .is_retryable());
        assert!(!ProviderError::Unavailable("disabled".into()).is_retryable());
    }

    #[test]
    fn batch_error_message_names_stage() {
        let err = BatchError {
            batch_id: "b00003".into(),
            stage: BatchStage::Upsert,
            attempts: 3,
            source: ProviderError::Status {
                service: "pinecone",
                status: 500,
                body: "boom".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("b00003"));
        assert!(msg.contains("upsert"));
        assert!(msg.contains("3 attempt"));
    }
}
