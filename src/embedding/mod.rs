//! Embedder implementations.
//!
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]** calls `POST /v1/embeddings`; needs `OPENAI_API_KEY`.
//! - **[`HashEmbedder`]** is offline FNV-1a feature hashing for tests and dry runs.
//! - **`LocalEmbedder`** runs models in-process via fastembed (feature
//!   `local-embeddings`); no network calls after the model download.
//!
//! # Retry Strategy
//!
//! The network embedders retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Network errors and timeouts → retry
//! - HTTP 4xx (client error, not 429) → fail immediately with
//!   [`Error::MalformedInput`]
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Once `max_retries` is exhausted the call fails with
//! [`Error::EmbeddingUnavailable`].

pub mod hash;

use std::sync::Arc;

use async_trait::async_trait;
use docrag_core::embedding::Embedder;
use docrag_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::http::{self, Outcome};

pub use hash::HashEmbedder;

/// POST `body` to `url`, retrying transient failures.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = http::backoff(attempt);
            debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match http::post_json(client, url, bearer, body).await {
            Outcome::Success(json) => return Ok(json),
            Outcome::Rejected(msg) => return Err(Error::MalformedInput(msg)),
            Outcome::Transient(msg) => {
                warn!(attempt, error = %msg, "embedding request failed");
                last_err = Some(msg);
            }
        }
    }

    Err(Error::EmbeddingUnavailable(last_err.unwrap_or_else(|| {
        "embedding failed after retries".to_string()
    })))
}

/// Reject responses whose vectors disagree with the configured dimensionality.
fn check_dims(expected: Option<usize>, vectors: &[Vec<f32>]) -> Result<()> {
    if let Some(dims) = expected {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::EmbeddingUnavailable(format!(
                "expected {}-dimensional vectors, got {}",
                dims,
                bad.len()
            )));
        }
    }
    Ok(())
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull mxbai-embed-large`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    endpoint: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            dims: config.dims,
            endpoint: format!("{}/api/embed", config.base_url()),
            max_retries: config.max_retries,
        })
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::EmbeddingUnavailable("invalid Ollama response: missing embeddings array".into())
        })?
        .iter()
        .map(|e| {
            http::f32_array(e).ok_or_else(|| {
                Error::EmbeddingUnavailable("invalid Ollama response: bad embedding".into())
            })
        })
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims.unwrap_or(0)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let json = post_with_retry(&self.client, &self.endpoint, None, &body, self.max_retries).await?;
        let vectors = parse_ollama_response(&json)?;
        check_dims(self.dims, &vectors)?;
        Ok(vectors)
    }
}

// ============ OpenAI ============

/// Embedder using the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIEmbedder {
    /// Fails with [`Error::Config`] if `OPENAI_API_KEY` is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            dims: config.dims,
            endpoint: format!("{}/v1/embeddings", config.base_url()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        Error::EmbeddingUnavailable("invalid OpenAI response: missing data array".into())
    })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vector = item
            .get("embedding")
            .and_then(http::f32_array)
            .ok_or_else(|| {
                Error::EmbeddingUnavailable("invalid OpenAI response: missing embedding".into())
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims.unwrap_or(0)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let json = post_with_retry(
            &self.client,
            &self.endpoint,
            Some(self.api_key.as_str()),
            &body,
            self.max_retries,
        )
        .await?;
        let vectors = parse_openai_response(&json)?;
        check_dims(self.dims, &vectors)?;
        Ok(vectors)
    }
}

// ============ Local (fastembed) ============

/// In-process embedder using fastembed. The model is downloaded from
/// Hugging Face on first use and cached.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((fastembed::EmbeddingModel::BGELargeENV15, 1024)),
        "mxbai-embed-large-v1" => Ok((fastembed::EmbeddingModel::MxbaiEmbedLargeV1, 1024)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        other => Err(Error::Config(format!(
            "Unknown local embedding model: '{}'. Supported models: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, mxbai-embed-large-v1, \
             nomic-embed-text-v1.5",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_kind, dims) = resolve_local_model(&config.model)?;
        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model_kind).with_show_download_progress(true),
            )
        })
        .await
        .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?
        .map_err(|e| {
            Error::EmbeddingUnavailable(format!("failed to initialize local model: {}", e))
        })?;

        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims.unwrap_or(dims),
            model: Arc::new(std::sync::Mutex::new(model)),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| Error::EmbeddingUnavailable("local model lock poisoned".into()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| Error::EmbeddingUnavailable(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?
    }
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"hash"` | [`HashEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings`) |
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(
            config.dims.unwrap_or(hash::DEFAULT_HASH_DIMS),
        )?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config).await?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(Error::Config(
            "Local embedding provider requires --features local-embeddings".into(),
        )),
        other => Err(Error::Config(format!("Unknown embedding provider: {}", other))),
    }
}
