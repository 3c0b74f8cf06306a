//! Vector store persistence and the swappable serving snapshot.
//!
//! A store is one JSON document on disk ([`crate::models::VectorStore`]).
//! Loading validates the store invariants; saving writes a temp file and
//! renames it so a crashed ingestion run never leaves a partial store.
//!
//! Serving reads go through [`StoreHandle`]: readers clone an
//! `Arc<StoreSnapshot>` (the lock is held only for the clone) and then run
//! the whole filter/score/rank pass lock-free over that immutable
//! snapshot. A reload builds and validates the replacement snapshot
//! completely before the swap, so a reader sees either the old store or
//! the new one, never a mix — and a failed reload leaves the old snapshot
//! queryable.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::EngineError;
use crate::models::{CaseMeta, VectorStore};

/// An immutable, fully-validated store plus its derived case index.
///
/// The index maps case id → case metadata for O(1) lookup during result
/// formatting. It is a cache rebuilt with every snapshot, never a source
/// of truth.
pub struct StoreSnapshot {
    pub store: VectorStore,
    case_index: HashMap<String, CaseMeta>,
}

impl StoreSnapshot {
    pub fn new(store: VectorStore) -> Self {
        let case_index = store
            .cases
            .iter()
            .map(|case| (case.id.clone(), case.clone()))
            .collect();
        Self { store, case_index }
    }

    pub fn case_by_id(&self, id: &str) -> Option<&CaseMeta> {
        self.case_index.get(id)
    }
}

/// Check the store invariants; returns a description of the first
/// violation found.
pub fn validate_store(store: &VectorStore) -> std::result::Result<(), String> {
    if store.chunk_count != store.chunks.len() {
        return Err(format!(
            "chunkCount {} does not match {} stored chunks",
            store.chunk_count,
            store.chunks.len()
        ));
    }

    let case_ids: HashSet<&str> = store.cases.iter().map(|c| c.id.as_str()).collect();
    // The first embedded vector's length is ground truth for the
    // store-wide dimension.
    let mut dims: Option<usize> = None;

    for chunk in &store.chunks {
        if !case_ids.contains(chunk.case_id.as_str()) {
            return Err(format!(
                "chunk {} references unknown case {}",
                chunk.id, chunk.case_id
            ));
        }
        match dims {
            None => dims = Some(chunk.embedding.len()),
            Some(d) if d != chunk.embedding.len() => {
                return Err(format!(
                    "chunk {} has embedding dimension {} but the store uses {}",
                    chunk.id,
                    chunk.embedding.len(),
                    d
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Load a store from disk.
///
/// A missing file yields `Ok(None)` — an absent store is a degraded
/// serving state, not a crash. A file that cannot be read, parsed, or
/// validated yields [`EngineError::StoreCorrupt`].
pub fn load_store(path: &Path) -> Result<Option<VectorStore>, EngineError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(EngineError::StoreCorrupt {
                path: path.display().to_string(),
                details: e.to_string(),
            })
        }
    };

    let store: VectorStore =
        serde_json::from_str(&raw).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

    validate_store(&store).map_err(|details| EngineError::StoreCorrupt {
        path: path.display().to_string(),
        details,
    })?;

    Ok(Some(store))
}

/// Persist a store atomically: write to a temp file, then rename over the
/// destination.
pub fn save_store(store: &VectorStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move store into place at {}", path.display()))?;

    Ok(())
}

/// Swappable handle to the current serving snapshot.
///
/// Single-writer, many-readers: the write lock is held only for the
/// pointer swap, so a reload never blocks in-flight queries on the old
/// snapshot, concurrent reloads are last-writer-wins, and requests
/// arriving after a completed swap always see the new snapshot.
pub struct StoreHandle {
    current: RwLock<Option<Arc<StoreSnapshot>>>,
    path: PathBuf,
}

impl StoreHandle {
    /// Create an empty handle serving from `path`. Nothing is loaded yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            current: RwLock::new(None),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current snapshot, if any. Callers hold the returned `Arc` for
    /// the duration of one request.
    pub async fn snapshot(&self) -> Option<Arc<StoreSnapshot>> {
        self.current.read().await.clone()
    }

    /// Publish a new snapshot. Indivisible with respect to readers.
    pub async fn replace(&self, snapshot: Arc<StoreSnapshot>) {
        *self.current.write().await = Some(snapshot);
    }

    /// Initial load at startup. An absent store leaves the handle empty
    /// and returns `Ok(None)` (degraded-but-running); a corrupt store is
    /// an error the caller can report while continuing to serve.
    pub async fn load_initial(&self) -> Result<Option<usize>, EngineError> {
        match load_store(&self.path)? {
            Some(store) => {
                let count = store.chunk_count;
                self.replace(Arc::new(StoreSnapshot::new(store))).await;
                Ok(Some(count))
            }
            None => Ok(None),
        }
    }

    /// Reload from disk and swap. The replacement is fully built and
    /// validated before the swap, so any failure (missing file, corrupt
    /// store) leaves the previous snapshot intact and queryable.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let store = load_store(&self.path)?.ok_or(EngineError::StoreUnavailable)?;
        let count = store.chunk_count;
        self.replace(Arc::new(StoreSnapshot::new(store))).await;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreChunk;
    use chrono::Utc;

    fn case(id: &str) -> CaseMeta {
        CaseMeta {
            id: id.to_string(),
            title: Some(format!("Case {}", id)),
            citation: None,
            court: Some("ONCA".to_string()),
            year: Some(2020),
            url: None,
        }
    }

    fn chunk(id: &str, case_id: &str, embedding: Vec<f32>) -> StoreChunk {
        StoreChunk {
            id: id.to_string(),
            case_id: case_id.to_string(),
            title: None,
            citation: None,
            court: None,
            year: None,
            url: None,
            text: "some text".to_string(),
            embedding,
        }
    }

    fn store(cases: Vec<CaseMeta>, chunks: Vec<StoreChunk>) -> VectorStore {
        VectorStore {
            model: "test-model".to_string(),
            generated_at: Utc::now(),
            chunk_words: 3,
            chunk_overlap: 1,
            chunk_count: chunks.len(),
            cases,
            chunks,
        }
    }

    #[test]
    fn test_validate_ok() {
        let s = store(
            vec![case("c1")],
            vec![
                chunk("c1::1", "c1", vec![0.0, 1.0]),
                chunk("c1::2", "c1", vec![1.0, 0.0]),
            ],
        );
        assert!(validate_store(&s).is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_case_id() {
        let s = store(vec![case("c1")], vec![chunk("c2::1", "c2", vec![0.0])]);
        let err = validate_store(&s).unwrap_err();
        assert!(err.contains("unknown case"));
    }

    #[test]
    fn test_validate_rejects_mixed_dimensions() {
        let s = store(
            vec![case("c1")],
            vec![
                chunk("c1::1", "c1", vec![0.0, 1.0]),
                chunk("c1::2", "c1", vec![1.0]),
            ],
        );
        let err = validate_store(&s).unwrap_err();
        assert!(err.contains("dimension"));
    }

    #[test]
    fn test_validate_rejects_bad_chunk_count() {
        let mut s = store(vec![case("c1")], vec![chunk("c1::1", "c1", vec![0.0])]);
        s.chunk_count = 7;
        assert!(validate_store(&s).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data").join("vector_store.json");
        let s = store(vec![case("c1")], vec![chunk("c1::1", "c1", vec![0.5, 0.5])]);

        save_store(&s, &path).unwrap();
        let loaded = load_store(&path).unwrap().expect("store should exist");
        assert_eq!(loaded.model, "test-model");
        assert_eq!(loaded.chunk_count, 1);
        assert_eq!(loaded.chunks[0].id, "c1::1");
    }

    #[test]
    fn test_persisted_field_names_are_camel_case() {
        let s = store(vec![case("c1")], vec![chunk("c1::1", "c1", vec![0.5])]);
        let json = serde_json::to_string(&s).unwrap();
        for field in [
            "\"generatedAt\"",
            "\"chunkWords\"",
            "\"chunkOverlap\"",
            "\"chunkCount\"",
            "\"caseId\"",
            "\"cases\"",
            "\"chunks\"",
        ] {
            assert!(json.contains(field), "missing field {}", field);
        }
    }

    #[test]
    fn test_load_missing_is_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = load_store(&tmp.path().join("nope.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_corrupt_is_distinguishable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vector_store.json");
        std::fs::write(&path, "{ not json").unwrap();
        match load_store(&path) {
            Err(EngineError::StoreCorrupt { .. }) => {}
            other => panic!("expected StoreCorrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_old_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vector_store.json");
        let s = store(vec![case("c1")], vec![chunk("c1::1", "c1", vec![0.5])]);
        save_store(&s, &path).unwrap();

        let handle = StoreHandle::new(path.clone());
        assert_eq!(handle.load_initial().await.unwrap(), Some(1));

        std::fs::remove_file(&path).unwrap();
        assert!(handle.reload().await.is_err());

        let snapshot = handle.snapshot().await.expect("old snapshot must survive");
        assert_eq!(snapshot.store.chunk_count, 1);
    }
}
