//! HTTP search API.
//!
//! Exposes the query pipeline and store reload over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/search` | Embed a query and return ranked cases |
//! | `POST` | `/api/reload` | Re-read the vector store from disk |
//! | `GET`  | `/health` | Health check (returns version and store state) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `embeddings_disabled` (400),
//! `embedding_failed` (502), `store_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::errors::EngineError;
use crate::models::{CaseResult, SearchFilters};
use crate::search;
use crate::store::StoreHandle;

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<StoreHandle>,
    provider: Arc<dyn EmbeddingProvider>,
}

/// Starts the search API server.
///
/// Binds to `[server].bind` and serves until the process is terminated.
/// A missing vector store at startup is reported but not fatal: the
/// server comes up degraded and answers searches with
/// `store_unavailable` until a successful `POST /api/reload`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let provider = embedding::create_provider(&config.embedding)?;
    let store = Arc::new(StoreHandle::new(config.store.path.clone()));

    match store.load_initial().await {
        Ok(Some(count)) => println!("Loaded vector store with {} chunk(s)", count),
        Ok(None) => println!(
            "No vector store at {} — serving degraded until one is ingested",
            config.store.path.display()
        ),
        Err(e) => eprintln!("Vector store failed to load: {} — serving degraded", e),
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        provider,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/search", post(handle_search))
        .route("/api/reload", post(handle_reload))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Search API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g. `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn embeddings_disabled() -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "embeddings_disabled".to_string(),
        message: "Embeddings are disabled; set embedding.provider in the config".to_string(),
    }
}

/// Map an engine failure to the error contract. Input mistakes are the
/// caller's (400); a provider failure is an upstream fault (502); an
/// absent or corrupt store is a service-side availability problem (503).
fn classify_engine_error(e: EngineError) -> AppError {
    match e {
        EngineError::Input(msg) => bad_request(msg),
        EngineError::EmbeddingProvider { source } => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "embedding_failed".to_string(),
            message: source.to_string(),
        },
        EngineError::StoreUnavailable => AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "store_unavailable".to_string(),
            message: "no vector store is loaded".to_string(),
        },
        EngineError::StoreCorrupt { .. } => AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "store_unavailable".to_string(),
            message: e.to_string(),
        },
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
    /// Whether a vector store is currently loaded.
    store_loaded: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_loaded: state.store.snapshot().await.is_some(),
    })
}

// ============ POST /api/search ============

/// Keywords accept both a single string (split on commas and whitespace)
/// and a JSON array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeywordsParam {
    One(String),
    Many(Vec<String>),
}

impl KeywordsParam {
    fn into_vec(self) -> Vec<String> {
        match self {
            KeywordsParam::One(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            KeywordsParam::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    year_from: Option<i32>,
    #[serde(default)]
    year_to: Option<i32>,
    #[serde(default)]
    court: Option<String>,
    #[serde(default)]
    keywords: Option<KeywordsParam>,
    /// Optional per-request result cap; the configured maximum applies
    /// as an upper bound.
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    results: Vec<CaseResult>,
    meta: SearchMeta,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchMeta {
    /// Results returned (after per-case aggregation and truncation).
    count: usize,
    /// Chunks that survived the metadata filter, before aggregation.
    total_candidates: usize,
    filters: SearchFilters,
    vector_store_generated_at: DateTime<Utc>,
    embedding_model: String,
}

/// Handler for `POST /api/search`.
///
/// Embeds the query, scores the current snapshot, and returns ranked
/// cases. The snapshot `Arc` is held for the request's duration, so a
/// concurrent reload never tears the result set.
async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !state.config.embedding.is_enabled() {
        return Err(embeddings_disabled());
    }

    let snapshot = state
        .store
        .snapshot()
        .await
        .ok_or_else(|| classify_engine_error(EngineError::StoreUnavailable))?;

    let query_vec = embedding::embed_query(state.provider.as_ref(), query)
        .await
        .map_err(classify_engine_error)?;

    let filters = search::build_filters(
        request.year_from,
        request.year_to,
        request.court,
        request.keywords.map(KeywordsParam::into_vec).unwrap_or_default(),
    );

    let configured_max = state.config.retrieval.max_results;
    let max_results = request
        .limit
        .filter(|&n| n > 0)
        .map(|n| n.min(configured_max))
        .unwrap_or(configured_max);

    let outcome = search::query_snapshot(
        &snapshot,
        &query_vec,
        &filters,
        max_results,
        state.config.retrieval.snippet_max_chars,
    );

    Ok(Json(SearchResponse {
        meta: SearchMeta {
            count: outcome.results.len(),
            total_candidates: outcome.total_candidates,
            filters,
            vector_store_generated_at: snapshot.store.generated_at,
            embedding_model: snapshot.store.model.clone(),
        },
        results: outcome.results,
    }))
}

// ============ POST /api/reload ============

/// JSON response body for `POST /api/reload`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReloadResponse {
    reloaded: bool,
    chunk_count: usize,
}

/// Handler for `POST /api/reload`.
///
/// Re-reads the store from disk and swaps it in atomically. On failure
/// the previous snapshot keeps serving and the error reports why.
async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let chunk_count = state.store.reload().await.map_err(classify_engine_error)?;
    println!("Reloaded vector store with {} chunk(s)", chunk_count);
    Ok(Json(ReloadResponse {
        reloaded: true,
        chunk_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_param_splits_single_string() {
        let one = KeywordsParam::One("duty, care negligence".to_string());
        assert_eq!(
            one.into_vec(),
            vec!["duty".to_string(), "care".to_string(), "negligence".to_string()]
        );
    }

    #[test]
    fn test_keywords_param_passes_array_through() {
        let many = KeywordsParam::Many(vec!["duty of care".to_string()]);
        assert_eq!(many.into_vec(), vec!["duty of care".to_string()]);
    }

    #[test]
    fn test_search_request_accepts_string_or_array_keywords() {
        let from_string: SearchRequest =
            serde_json::from_str(r#"{"query":"q","keywords":"duty care"}"#).unwrap();
        let kws = from_string.keywords.map(KeywordsParam::into_vec).unwrap_or_default();
        assert_eq!(kws, vec!["duty".to_string(), "care".to_string()]);

        let from_array: SearchRequest =
            serde_json::from_str(r#"{"query":"q","keywords":["duty of care"]}"#).unwrap();
        let kws = from_array.keywords.map(KeywordsParam::into_vec).unwrap_or_default();
        assert_eq!(kws, vec!["duty of care".to_string()]);
    }

    #[test]
    fn test_engine_error_mapping() {
        let e = classify_engine_error(EngineError::Input("bad".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e = classify_engine_error(EngineError::StoreUnavailable);
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code, "store_unavailable");

        let e = classify_engine_error(EngineError::EmbeddingProvider {
            source: anyhow::anyhow!("boom"),
        });
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "embedding_failed");

        let e = classify_engine_error(EngineError::StoreCorrupt {
            path: "p".into(),
            details: "d".into(),
        });
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code, "store_unavailable");
    }
}
