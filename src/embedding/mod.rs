//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used for dry runs and when embeddings are off.
//! - **[`OpenAIProvider`]** — calls the OpenAI embeddings API.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashProvider`]** — deterministic SHA-256 pseudo-embeddings for offline runs and tests.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use transcript_ingest::config::EmbeddingConfig;
//! # use transcript_ingest::embedding::create_provider;
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Errors and retries
//!
//! Providers make exactly one request per call. Retrying is the caller's
//! job; [`ProviderError::is_retryable`] tells it which failures deserve
//! another attempt (429, 5xx, network errors).

use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, ProviderError};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Trait for embedding providers.
///
/// `embed` returns one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `3072`).
    fn dims(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unavailable(
            "Embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::invalid("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self, ConfigError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| ConfigError::invalid("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| ConfigError::invalid("embedding.dims required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            url,
            model,
            dims,
        })
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        // Only the v3 models accept a reduced output size.
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dims);
        }
        body
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("openai", e))?;

        let json = read_json("openai", response).await?;
        parse_openai_response(&json)
    }
}

/// Extract the `data[].embedding` arrays, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let invalid = |message: &str| ProviderError::InvalidResponse {
        service: "openai",
        message: message.to_string(),
    };

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| ConfigError::invalid("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| ConfigError::invalid("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims,
            url,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                service: "ollama",
                message: format!("is Ollama running at {}? {}", self.url, e),
            })?;

        let json = read_json("ollama", response).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let invalid = |message: &str| ProviderError::InvalidResponse {
        service: "ollama",
        message: message.to_string(),
    };

    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| invalid("embedding is not an array"))
        })
        .collect()
}

// ============ Hash Provider ============

/// Deterministic pseudo-embeddings derived from SHA-256 of the text.
///
/// Vectors are unit length. Identical texts get identical vectors; there is
/// no semantic similarity between different texts.
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dims);
        let mut block = 0u64;
        while values.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(block.to_le_bytes());
            hasher.update(text.as_bytes());
            for pair in hasher.finalize().chunks_exact(2) {
                if values.len() == self.dims {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                values.push(raw as f32 / u16::MAX as f32 * 2.0 - 1.0);
            }
            block += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "sha256-hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Shared helpers ============

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigError::invalid(format!("failed to build HTTP client: {}", e)))
}

/// Turn a non-2xx response into [`ProviderError::Status`], otherwise parse JSON.
pub(crate) async fn read_json(
    service: &'static str,
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            service,
            message: e.to_string(),
        })
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"hash"` | [`HashProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, ConfigError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "hash" => {
            let dims = config
                .dims
                .ok_or_else(|| ConfigError::invalid("embedding.dims required for hash provider"))?;
            Ok(Box::new(HashProvider::new(dims)))
        }
        other => Err(ConfigError::invalid(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_provider_is_deterministic_and_unit_length() {
        let provider = HashProvider::new(40);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = provider.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 40));
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let err = DisabledProvider.embed(&["x".to_string()]).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn openai_response_missing_data_is_invalid() {
        let err = parse_openai_response(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn openai_body_requests_configured_dimensions() {
        let config = EmbeddingConfig {
            dims: Some(256),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(&config, "sk-test".to_string()).unwrap();
        let body = provider.request_body(&["hi".to_string()]);
        assert_eq!(body["dimensions"], 256);
        assert_eq!(body["model"], "text-embedding-3-large");
    }

    #[test]
    fn create_provider_hash_and_unknown() {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            model: None,
            dims: Some(16),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dims(), 16);

        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
