//! Corpus ingestion: chunk every case, embed every chunk, persist the
//! store.
//!
//! Ingestion is all-or-nothing. A run that cannot embed every chunk
//! writes nothing, so the store on disk is always internally consistent
//! (any previous store survives a failed run untouched).

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::{chunk_id, chunk_text};
use crate::config::Config;
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::errors::EngineError;
use crate::models::{CaseMeta, SourceCase, StoreChunk, VectorStore};
use crate::store::save_store;

/// Split every case body into chunk windows, without embeddings.
///
/// Every case lands in the registry, including cases with empty bodies —
/// they simply contribute no chunks. Chunk ids are the case id plus the
/// chunk's 1-based ordinal within that case, and parent metadata is
/// denormalized onto each chunk.
pub fn build_chunk_drafts(
    cases: &[SourceCase],
    chunk_words: usize,
    overlap: usize,
) -> (Vec<CaseMeta>, Vec<StoreChunk>) {
    let mut registry = Vec::with_capacity(cases.len());
    let mut drafts = Vec::new();

    for case in cases {
        let meta = case.meta();
        for (i, text) in chunk_text(case.body_text(), chunk_words, overlap)
            .into_iter()
            .enumerate()
        {
            drafts.push(StoreChunk {
                id: chunk_id(&case.id, i + 1),
                case_id: case.id.clone(),
                title: meta.title.clone(),
                citation: meta.citation.clone(),
                court: meta.court.clone(),
                year: meta.year,
                url: meta.url.clone(),
                text,
                embedding: Vec::new(),
            });
        }
        registry.push(meta);
    }

    (registry, drafts)
}

/// Chunk and embed a corpus into a complete in-memory store.
pub async fn ingest_cases(
    config: &Config,
    provider: Arc<dyn EmbeddingProvider>,
    cases: &[SourceCase],
) -> Result<VectorStore, EngineError> {
    if cases.is_empty() {
        return Err(EngineError::Input("the corpus contains no cases".into()));
    }

    let (registry, mut drafts) = build_chunk_drafts(
        cases,
        config.chunking.chunk_words,
        config.chunking.overlap_words,
    );
    if drafts.is_empty() {
        return Err(EngineError::Input(
            "no case produced any chunks (all bodies empty?)".into(),
        ));
    }

    let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
    let embeddings = embed_texts(provider.clone(), &config.embedding, &texts).await?;

    for (draft, embedding) in drafts.iter_mut().zip(embeddings) {
        draft.embedding = embedding;
    }

    Ok(VectorStore {
        model: provider.model_name().to_string(),
        generated_at: Utc::now(),
        chunk_words: config.chunking.chunk_words,
        chunk_overlap: config.chunking.overlap_words,
        chunk_count: drafts.len(),
        cases: registry,
        chunks: drafts,
    })
}

fn read_cases(path: &Path) -> Result<Vec<SourceCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file {}", path.display()))?;
    let cases: Vec<SourceCase> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse corpus file {}", path.display()))?;
    Ok(cases)
}

/// `caselens ingest` — read the corpus, build the store, write it out.
///
/// `--dry-run` never touches the embedding provider, so it works without
/// credentials.
pub async fn run_ingest(
    config: &Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let input = input.unwrap_or_else(|| PathBuf::from("data/cases.json"));
    let output = output.unwrap_or_else(|| config.store.path.clone());

    let cases = read_cases(&input)?;
    println!("Read {} case(s) from {}", cases.len(), input.display());

    if dry_run {
        let (registry, drafts) = build_chunk_drafts(
            &cases,
            config.chunking.chunk_words,
            config.chunking.overlap_words,
        );
        let with_chunks: std::collections::HashSet<&str> =
            drafts.iter().map(|d| d.case_id.as_str()).collect();
        let bodyless = registry.len() - with_chunks.len();
        println!(
            "Dry run: {} chunk(s) across {} case(s)",
            drafts.len(),
            registry.len()
        );
        if bodyless > 0 {
            println!(
                "  {} case(s) have no body text and would contribute no chunks",
                bodyless
            );
        }
        println!(
            "  chunk_words = {}, overlap = {}",
            config.chunking.chunk_words, config.chunking.overlap_words
        );
        println!("Nothing written.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        anyhow::bail!("Embeddings are disabled; set embedding.provider in the config to ingest");
    }

    let provider = crate::embedding::create_provider(&config.embedding)?;
    let store = ingest_cases(config, provider, &cases).await?;

    save_store(&store, &output)?;

    println!("Ingestion complete:");
    println!("  Model:   {}", store.model);
    println!("  Cases:   {}", store.cases.len());
    println!("  Chunks:  {}", store.chunk_count);
    println!("  Store:   {}", output.display());

    Ok(())
}
