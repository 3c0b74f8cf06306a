//! Core data models for the ingestion and retrieval pipeline.
//!
//! The persisted vector store uses camelCase field names on disk; those
//! names are the durable contract between ingestion and serving and must
//! not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Case metadata as recorded in the store's case registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMeta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A raw case document as it appears in the ingestion input file.
///
/// Either `body` or `text` may carry the decision text; `body` wins when
/// both are present.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCase {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl SourceCase {
    /// The decision text to chunk, preferring `body` over `text`.
    pub fn body_text(&self) -> &str {
        self.body
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    /// Strip the body down to registry metadata.
    pub fn meta(&self) -> CaseMeta {
        CaseMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            citation: self.citation.clone(),
            court: self.court.clone(),
            year: self.year,
            url: self.url.clone(),
        }
    }
}

/// One embedded chunk window.
///
/// Parent-case metadata is denormalized onto every chunk so filtering and
/// display need no join. The copies are refreshed only by a full
/// re-ingestion — there is no per-field update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreChunk {
    /// `caseId` + `"::"` + 1-based ordinal within the case.
    pub id: String,
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// The persisted vector store: one JSON document holding the case
/// registry and every chunk with its embedding.
///
/// Invariants (checked by [`crate::store::validate_store`]):
/// - every chunk's `caseId` resolves in `cases`
/// - all embeddings share one dimension
/// - `chunkCount` equals `chunks.len()`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStore {
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub chunk_words: usize,
    pub chunk_overlap: usize,
    pub chunk_count: usize,
    pub cases: Vec<CaseMeta>,
    pub chunks: Vec<StoreChunk>,
}

/// Structured filters applied to chunk metadata before scoring.
///
/// An unset field disables its clause entirely; `keywords` must already be
/// lower-cased and are ANDed as literal substrings.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// A chunk paired with its similarity score against one query vector.
/// Transient — never persisted.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a StoreChunk,
    pub score: f64,
}

/// One ranked search result joined back to case metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub snippet: String,
    pub score: f64,
}
