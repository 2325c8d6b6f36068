//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible embeddings API with retry and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs the model in-process via fastembed (primary) or tract
//!   (musl/Intel Mac); no network calls after the model download.
//!
//! On top of the trait sit the two operations the pipeline uses:
//! - [`embed`]: one text to one vector, hard failure on any backend problem.
//! - [`embed_batch`]: a path-keyed map of texts to a path-keyed map of vectors.
//!
//! # Pooling
//!
//! Both local backends load `snowflake-arctic-embed-m` by default and
//! mean-pool token vectors weighted by the attention mask; inputs are
//! truncated to `embedding.max_length` tokens (512 by default). The tract
//! pipeline does the pooling itself ([`mean_pool`]) and leaves vectors
//! unnormalized. fastembed is handed `Pooling::Mean` explicitly
//! and L2-normalizes its output.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings-tract")]
mod local_tract;
#[cfg(any(
    feature = "local-embeddings-fastembed",
    feature = "local-embeddings-tract"
))]
pub mod model_files;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::CheckError;

const SERVICE: &str = "embedding backend";

/// Denominator floor for [`mean_pool`]; keeps all-padding rows finite.
pub const POOLING_EPSILON: f32 = 1e-9;

/// Trait for embedding providers.
///
/// Implementations return exactly one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"snowflake-arctic-embed-m"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError>;
}

/// Embed a single text.
///
/// Fails if the backend fails, returns nothing, or returns a vector whose
/// length differs from [`Embedder::dims`]. There is no zero-vector fallback
/// here; only the batch index build degrades that way.
pub async fn embed(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, CheckError> {
    let vector = embedder
        .embed_texts(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CheckError::malformed(SERVICE, "empty embedding response"))?;
    check_dims(embedder, &vector)?;
    Ok(vector)
}

/// Embed a map of `path → text`, returning `path → vector` for every key.
///
/// Inputs are ordered by text length before being sliced into batches of
/// `batch_size`, so each backend call pads to similar lengths. Vectors are
/// scattered back by key, so the output never depends on that ordering.
/// Any backend failure fails the whole call.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    snippets: &BTreeMap<String, String>,
    batch_size: usize,
) -> Result<BTreeMap<String, Vec<f32>>, CheckError> {
    let mut ordered: Vec<(&String, &String)> = snippets.iter().collect();
    ordered.sort_by_key(|(_, text)| text.len());

    let mut embeddings = BTreeMap::new();

    for batch in ordered.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| (*text).clone()).collect();
        let vectors = embedder.embed_texts(&texts).await?;

        if vectors.len() != batch.len() {
            return Err(CheckError::malformed(
                SERVICE,
                format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
            ));
        }

        for ((path, _), vector) in batch.iter().zip(vectors) {
            check_dims(embedder, &vector)?;
            embeddings.insert((*path).clone(), vector);
        }
    }

    Ok(embeddings)
}

fn check_dims(embedder: &dyn Embedder, vector: &[f32]) -> Result<(), CheckError> {
    if vector.len() != embedder.dims() {
        return Err(CheckError::malformed(
            SERVICE,
            format!(
                "model '{}' returned {} dimensions, expected {}",
                embedder.model_name(),
                vector.len(),
                embedder.dims()
            ),
        ));
    }
    Ok(())
}

/// Mean-pool one sequence of token vectors, weighted by its attention mask.
///
/// `hidden` is row-major `[seq_len, dims]`; `mask` holds `seq_len` entries
/// where `0` marks padding. Padding rows contribute nothing and the divisor
/// is clamped to [`POOLING_EPSILON`], so an all-padding input pools to zeros.
pub fn mean_pool(hidden: &[f32], mask: &[i64], seq_len: usize, dims: usize) -> Vec<f32> {
    let mut sum = vec![0f32; dims];
    let mut count = 0f32;

    for (j, &m) in mask.iter().take(seq_len).enumerate() {
        if m == 0 {
            continue;
        }
        let weight = m as f32;
        let row = &hidden[j * dims..(j + 1) * dims];
        for (acc, &v) in sum.iter_mut().zip(row) {
            *acc += v * weight;
        }
        count += weight;
    }

    let denom = count.max(POOLING_EPSILON);
    for x in &mut sum {
        *x /= denom;
    }
    sum
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider {
    dims: usize,
}

impl DisabledProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        Err(CheckError::unavailable(
            SERVICE,
            "Embedding provider is disabled",
        ))
    }
}

// ============ HTTP retry ============

/// POST `body` to `url` with exponential backoff on 429, 5xx and network errors.
async fn post_with_backoff(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value, CheckError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| CheckError::malformed(service, e));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = CheckError::Upstream {
                    service: service.to_string(),
                    status: status.as_u16(),
                    body: body_text,
                };

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(attempt, %status, "{} request failed, retrying", service);
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "{} unreachable", service);
                last_err = Some(CheckError::unavailable(service, e));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| CheckError::unavailable(service, "request failed after retries")))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read `json[key]` as an array of float arrays.
fn parse_vectors<'a>(
    items: impl Iterator<Item = Option<&'a serde_json::Value>>,
    service: &str,
) -> Result<Vec<Vec<f32>>, CheckError> {
    items
        .map(|item| {
            item.and_then(|e| e.as_array())
                .map(|values| {
                    values
                        .iter()
                        .map(|v| {
                            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                                CheckError::malformed(service, "embedding element is not a number")
                            })
                        })
                        .collect::<Result<Vec<f32>, CheckError>>()
                })
                .ok_or_else(|| CheckError::malformed(service, "embedding is not an array"))?
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using an OpenAI-compatible API.
///
/// Calls `POST {url}/v1/embeddings` (default `https://api.openai.com`).
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `model` is not set in config or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            dims: config.dims,
            url,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_backoff(
            &self.client,
            &format!("{}/v1/embeddings", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI embeddings API",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, CheckError> {
    let service = "OpenAI embeddings API";
    let mut data: Vec<&serde_json::Value> = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| CheckError::malformed(service, "missing data array"))?
        .iter()
        .collect();

    data.sort_by_key(|item| item.get("index").and_then(|i| i.as_u64()).unwrap_or(0));

    parse_vectors(data.into_iter().map(|item| item.get("embedding")), service)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims: config.dims,
            url,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_backoff(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, CheckError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| CheckError::malformed("Ollama", "missing embeddings array"))?;
    parse_vectors(embeddings.iter().map(Some), "Ollama")
}

// ============ Local Provider (fastembed) ============

/// Pooling handed to fastembed for every local model.
#[cfg(feature = "local-embeddings-fastembed")]
pub const LOCAL_POOLING: fastembed::Pooling = fastembed::Pooling::Mean;

/// In-process embedding via fastembed.
///
/// The model files are fetched into the copyscan cache and loaded as a
/// user-defined model so the pooling is ours, not the model registry's.
/// Inference needs `&mut`, so calls are serialized behind a mutex and run on
/// the blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        use model_files::{
            CONFIG_FILE, ONNX_FILE, SPECIAL_TOKENS_FILE, TOKENIZER_CONFIG_FILE, TOKENIZER_FILE,
        };

        let (model_name, files) = model_files::resolve(config)?;
        let dir = model_files::fetch(
            &model_name,
            &files,
            &[
                ONNX_FILE,
                TOKENIZER_FILE,
                CONFIG_FILE,
                SPECIAL_TOKENS_FILE,
                TOKENIZER_CONFIG_FILE,
            ],
        )?;
        let read = |name: &str| {
            std::fs::read(dir.join(name))
                .map_err(|e| anyhow::anyhow!("Read {}: {}", dir.join(name).display(), e))
        };

        let tokenizer_files = fastembed::TokenizerFiles {
            tokenizer_file: read(TOKENIZER_FILE)?,
            config_file: read(CONFIG_FILE)?,
            special_tokens_map_file: read(SPECIAL_TOKENS_FILE)?,
            tokenizer_config_file: read(TOKENIZER_CONFIG_FILE)?,
        };
        let user_model = fastembed::UserDefinedEmbeddingModel::new(read(ONNX_FILE)?, tokenizer_files)
            .with_pooling(LOCAL_POOLING);

        let model = fastembed::TextEmbedding::try_new_from_user_defined(
            user_model,
            fastembed::InitOptionsUserDefined::new().with_max_length(config.max_length),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        tracing::info!(model = %model_name, dims = files.dims, "local model loaded");

        Ok(Self {
            model_name,
            dims: files.dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| CheckError::unavailable(SERVICE, "local model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| CheckError::unavailable(SERVICE, format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| CheckError::Internal(e.into()))?
    }
}

#[cfg(all(
    feature = "local-embeddings-tract",
    not(feature = "local-embeddings-fastembed")
))]
pub use local_tract::TractProvider as LocalProvider;

/// Create the [`Embedder`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (fastembed or tract, see features) |
///
/// Local models are loaded here, once; callers share the returned handle.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        ))]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        )))]
        "local" => anyhow::bail!(
            "Local embedding provider requires one of: --features local-embeddings-fastembed, --features local-embeddings-tract"
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}
