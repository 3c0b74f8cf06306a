//! Embedding provider abstraction and the batch embedding client.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed` endpoint.
//!
//! [`embed_texts`] is the batch client: it splits an ordered input into
//! batches of `batch_size`, runs up to `max_concurrent_batches` provider
//! calls at once, and reassembles the outputs by original batch index so
//! batch boundaries and completion order can never reorder, drop, or
//! duplicate an entry. Any batch failure fails the whole call.
//!
//! Also provides [`cosine_similarity`], the fixed geometric scoring
//! function used at query time.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient
//! errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EmbeddingConfig;
use crate::errors::EngineError;

/// Trait for embedding providers.
///
/// One call to [`EmbeddingProvider::embed_batch`] embeds one bounded batch;
/// batching across a whole corpus is the client's job ([`embed_texts`]).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one batch of texts, returning one vector per input, in input
    /// order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_embeddings_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let vectors = parse_openai_response(&json)?;
        check_batch_shape(texts.len(), &vectors, "OpenAI")?;
        Ok(vectors)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays in response order, which the API
/// guarantees matches input order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".into());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
            max_retries: config.max_retries,
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

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_embeddings_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

        let mut vectors = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            let vec: Vec<f32> = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            vectors.push(vec);
        }

        check_batch_shape(texts.len(), &vectors, "Ollama")?;
        Ok(vectors)
    }
}

/// POST a JSON body with exponential-backoff retry for transient failures.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
async fn post_embeddings_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    what: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", what, status, body_text));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", what, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", what, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", what)))
}

/// A provider must return exactly one vector per input text.
fn check_batch_shape(expected: usize, vectors: &[Vec<f32>], what: &str) -> Result<()> {
    if vectors.len() != expected {
        bail!(
            "{} returned {} embeddings for {} inputs",
            what,
            vectors.len(),
            expected
        );
    }
    Ok(())
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Batch client ============

/// Embed an ordered sequence of texts, preserving order across batches.
///
/// Texts are split into batches of `config.batch_size`; up to
/// `config.max_concurrent_batches` provider calls run at once, and each
/// completed batch is written into a slot keyed by its original batch
/// index, so completion order never affects output order. If any batch
/// fails, the whole call fails with [`EngineError::EmbeddingProvider`] and
/// still-pending batches are aborted; partial results are discarded.
pub async fn embed_texts(
    provider: Arc<dyn EmbeddingProvider>,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EngineError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = config.batch_size.max(1);
    let batches: Vec<Vec<String>> = texts.chunks(batch_size).map(|b| b.to_vec()).collect();
    let batch_count = batches.len();

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
    let mut join_set = JoinSet::new();

    for (index, batch) in batches.into_iter().enumerate() {
        let provider = provider.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| anyhow!("embedding concurrency limiter closed"))?;
            let vectors = provider.embed_batch(&batch).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "provider returned {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            Ok::<(usize, Vec<Vec<f32>>), anyhow::Error>((index, vectors))
        });
    }

    let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];

    while let Some(joined) = join_set.join_next().await {
        let outcome = joined.map_err(|e| EngineError::EmbeddingProvider {
            source: anyhow!("embedding task failed: {}", e),
        })?;
        match outcome {
            Ok((index, vectors)) => slots[index] = Some(vectors),
            Err(source) => {
                join_set.abort_all();
                return Err(EngineError::EmbeddingProvider { source });
            }
        }
    }

    let mut out = Vec::with_capacity(texts.len());
    for slot in slots {
        let vectors = slot.ok_or_else(|| EngineError::EmbeddingProvider {
            source: anyhow!("missing embedding batch result"),
        })?;
        out.extend(vectors);
    }

    Ok(out)
}

/// Embed a single query text.
///
/// Convenience wrapper for query-time use: one batch, no concurrency.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EngineError> {
    let mut vectors = provider
        .embed_batch(&[text.to_string()])
        .await
        .map_err(|source| EngineError::EmbeddingProvider { source })?;

    if vectors.is_empty() {
        return Err(EngineError::EmbeddingProvider {
            source: anyhow!("empty embedding response"),
        });
    }
    Ok(vectors.remove(0))
}

// ============ Similarity ============

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, accumulating the dot product and both
/// squared norms in one `f64` pass.
///
/// Returns `0.0` when either vector is empty, the lengths differ, or the
/// product of norms is zero. Callers must not read `0.0` as evidence of
/// orthogonality — it may be the degenerate-input fallback. This policy is
/// a preserved compatibility contract: changing it would alter ranking for
/// malformed or legacy store data.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}
