//! Error taxonomy for the engine's boundary components.
//!
//! Pure computational code (chunker, filter, scorer, ranker, formatter)
//! never fails on malformed-but-present data — it applies documented
//! fallbacks instead. Only the boundaries raise: the embedding client and
//! vector store I/O produce [`EngineError`], which the CLI surfaces
//! through anyhow and the HTTP server maps to status codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller mistake: empty query text, an empty corpus, or a document
    /// set that produced no chunks. Reported synchronously, never retried.
    #[error("invalid input: {0}")]
    Input(String),

    /// The external embedding provider failed (network, auth, rate limit).
    /// Fatal for an ingestion run; a request-level failure at query time.
    #[error("embedding provider failure: {source}")]
    EmbeddingProvider {
        #[source]
        source: anyhow::Error,
    },

    /// No vector store is currently loaded. The service is degraded but
    /// running; queries must report "not ready" rather than empty success.
    #[error("no vector store is loaded")]
    StoreUnavailable,

    /// The persisted store exists but failed to parse or validate.
    /// Availability-wise identical to absent, but distinguishable in
    /// diagnostics.
    #[error("vector store at {path} is corrupt: {details}")]
    StoreCorrupt { path: String, details: String },
}

impl EngineError {
    /// Whether a caller may safely retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::EmbeddingProvider { .. })
    }
}
