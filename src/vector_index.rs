//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between the pipeline and whatever
//! stores the vectors. Upserts overwrite by id, which is what makes
//! re-ingestion idempotent.
//!
//! - **[`PineconeIndex`]** — Pinecone serverless over its REST API.
//! - **[`MemoryIndex`]** — `HashMap` behind a `RwLock`, for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::config::IndexConfig;
use crate::embedding::read_json;
use crate::error::{ConfigError, ProviderError};
use crate::models::UpsertRecord;

/// Pinecone rejects upsert requests above this many vectors.
const PINECONE_MAX_UPSERT: usize = 100;
const PINECONE_API_VERSION: &str = "2024-07";
const READY_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dotproduct",
        }
    }
}

/// What the index must look like before anything is written to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Create the index if it does not exist; verify its dimension if it does.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ProviderError>;

    /// Insert or overwrite `records` by id. Returns how many were written.
    async fn upsert(&self, records: &[UpsertRecord]) -> Result<usize, ProviderError>;
}

// ============ Pinecone ============

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    name: String,
    cloud: String,
    region: String,
    namespace: Option<String>,
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: Option<usize>,
    host: Option<String>,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl PineconeIndex {
    /// Requires `PINECONE_API_KEY` in the environment.
    pub fn new(config: &IndexConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| ConfigError::invalid("PINECONE_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &IndexConfig, api_key: String) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::invalid(format!("failed to build HTTP client: {}", e)))?;

        let host = OnceCell::new();
        if let Some(h) = &config.host {
            let _ = host.set(normalize_host(h));
        }

        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            name: config.name.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            namespace: config.namespace.clone(),
            host,
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    /// `None` when the index does not exist.
    async fn describe(&self) -> Result<Option<IndexDescription>, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                format!("{}/indexes/{}", self.api_url, self.name),
            )
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("pinecone", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let json = read_json("pinecone", response).await?;
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| ProviderError::InvalidResponse {
                service: "pinecone",
                message: e.to_string(),
            })
    }

    async fn create(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric.as_str(),
            "spec": {
                "serverless": {
                    "cloud": self.cloud,
                    "region": self.region,
                }
            }
        });
        let response = self
            .request(reqwest::Method::POST, format!("{}/indexes", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("pinecone", e))?;

        // 409: created concurrently by someone else.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        read_json("pinecone", response).await.map(|_| ())
    }

    async fn wait_until_ready(&self) -> Result<IndexDescription, ProviderError> {
        for _ in 0..READY_POLL_ATTEMPTS {
            if let Some(desc) = self.describe().await? {
                if desc.status.ready {
                    return Ok(desc);
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(ProviderError::Unavailable(format!(
            "index {} did not become ready",
            self.name
        )))
    }

    async fn resolve_host(&self) -> Result<&str, ProviderError> {
        self.host
            .get_or_try_init(|| async {
                let desc = self.describe().await?.ok_or_else(|| {
                    ProviderError::Unavailable(format!(
                        "index {} does not exist; run `tingest init-index`",
                        self.name
                    ))
                })?;
                desc.host
                    .map(|h| normalize_host(&h))
                    .ok_or_else(|| ProviderError::InvalidResponse {
                        service: "pinecone",
                        message: "index description has no host".to_string(),
                    })
            })
            .await
            .map(String::as_str)
    }

    async fn upsert_slice(&self, host: &str, records: &[UpsertRecord]) -> Result<usize, ProviderError> {
        let mut body = serde_json::json!({ "vectors": records });
        if let Some(ns) = &self.namespace {
            body["namespace"] = Value::String(ns.clone());
        }

        let response = self
            .request(reqwest::Method::POST, format!("{}/vectors/upsert", host))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("pinecone", e))?;

        let json = read_json("pinecone", response).await?;
        Ok(json
            .get("upsertedCount")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .unwrap_or(records.len()))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        match self.describe().await? {
            Some(desc) => {
                check_dimension(&spec.name, desc.dimension, spec.dimension)?;
                if let Some(h) = desc.host {
                    let _ = self.host.set(normalize_host(&h));
                }
            }
            None => {
                tracing::info!(index = %spec.name, dimension = spec.dimension, "creating index");
                self.create(spec).await?;
                let desc = self.wait_until_ready().await?;
                check_dimension(&spec.name, desc.dimension, spec.dimension)?;
                if let Some(h) = desc.host {
                    let _ = self.host.set(normalize_host(&h));
                }
            }
        }
        Ok(())
    }

    async fn upsert(&self, records: &[UpsertRecord]) -> Result<usize, ProviderError> {
        if records.is_empty() {
            return Ok(0);
        }
        let host = self.resolve_host().await?.to_string();
        let mut written = 0;
        for slice in records.chunks(PINECONE_MAX_UPSERT) {
            written += self.upsert_slice(&host, slice).await?;
        }
        Ok(written)
    }
}

fn check_dimension(name: &str, actual: Option<usize>, expected: usize) -> Result<(), ProviderError> {
    match actual {
        Some(d) if d != expected => Err(ProviderError::InvalidResponse {
            service: "pinecone",
            message: format!(
                "index {} has dimension {}, embeddings have {}",
                name, d, expected
            ),
        }),
        _ => Ok(()),
    }
}

// ============ In-memory ============

#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// In-memory index. Counts upsert calls so tests can assert on batching.
pub struct MemoryIndex {
    name: String,
    spec: RwLock<Option<IndexSpec>>,
    vectors: RwLock<HashMap<String, StoredVector>>,
    upsert_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spec: RwLock::new(None),
            vectors: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.read_vectors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_vectors().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &str) -> Option<StoredVector> {
        self.read_vectors().get(id).cloned()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn read_vectors(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, StoredVector>> {
        self.vectors.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        let mut current = self.spec.write().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(existing) => check_dimension(&existing.name, Some(existing.dimension), spec.dimension),
            None => {
                *current = Some(spec.clone());
                Ok(())
            }
        }
    }

    async fn upsert(&self, records: &[UpsertRecord]) -> Result<usize, ProviderError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let expected = self
            .spec
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.dimension);
        if let Some(dimension) = expected {
            if let Some(bad) = records.iter().find(|r| r.values.len() != dimension) {
                return Err(ProviderError::InvalidResponse {
                    service: "memory",
                    message: format!(
                        "vector {} has {} values, index expects {}",
                        bad.id,
                        bad.values.len(),
                        dimension
                    ),
                });
            }
        }

        let mut vectors = self.vectors.write().unwrap_or_else(|e| e.into_inner());
        for record in records {
            vectors.insert(
                record.id.as_str().to_string(),
                StoredVector {
                    values: record.values.clone(),
                    metadata: record.metadata.clone(),
                },
            );
        }
        Ok(records.len())
    }
}

/// Create the configured [`VectorIndex`].
pub fn create_index(config: &IndexConfig) -> Result<Box<dyn VectorIndex>, ConfigError> {
    match config.provider.as_str() {
        "pinecone" => Ok(Box::new(PineconeIndex::new(config)?)),
        "memory" => Ok(Box::new(MemoryIndex::new(&config.name))),
        other => Err(ConfigError::invalid(format!(
            "Unknown index provider: {}",
            other
        ))),
    }
}
