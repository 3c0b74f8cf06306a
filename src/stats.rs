//! `caselens stats` — summarize the persisted vector store.

use anyhow::{bail, Result};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::VectorStore;
use crate::store::load_store;

/// Per-court case counts, sorted by court name. Cases without a court
/// are grouped under `(unknown)`.
fn court_breakdown(store: &VectorStore) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for case in &store.cases {
        let court = case
            .court
            .clone()
            .unwrap_or_else(|| "(unknown)".to_string());
        *counts.entry(court).or_insert(0) += 1;
    }
    counts
}

pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.store.path;
    let store = match load_store(path)? {
        Some(store) => store,
        None => bail!("No vector store at {}. Run `caselens ingest` first.", path.display()),
    };

    let dims = store
        .chunks
        .first()
        .map(|c| c.embedding.len())
        .unwrap_or(0);

    println!("Vector store: {}", path.display());
    println!("  Model:       {}", store.model);
    println!("  Generated:   {}", store.generated_at.to_rfc3339());
    println!("  Chunking:    {} words, {} overlap", store.chunk_words, store.chunk_overlap);
    println!("  Cases:       {}", store.cases.len());
    println!("  Chunks:      {}", store.chunk_count);
    println!("  Dimensions:  {}", dims);

    let breakdown = court_breakdown(&store);
    if !breakdown.is_empty() {
        println!("\nCases by court:");
        for (court, count) in &breakdown {
            println!("  {:<12} {}", court, count);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaseMeta;
    use chrono::Utc;

    #[test]
    fn test_court_breakdown_groups_and_sorts() {
        let case = |id: &str, court: Option<&str>| CaseMeta {
            id: id.to_string(),
            title: None,
            citation: None,
            court: court.map(str::to_string),
            year: None,
            url: None,
        };
        let store = VectorStore {
            model: "m".to_string(),
            generated_at: Utc::now(),
            chunk_words: 220,
            chunk_overlap: 40,
            chunk_count: 0,
            cases: vec![
                case("a", Some("SCC")),
                case("b", Some("ONCA")),
                case("c", Some("SCC")),
                case("d", None),
            ],
            chunks: vec![],
        };

        let breakdown = court_breakdown(&store);
        let entries: Vec<(&str, usize)> =
            breakdown.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            entries,
            vec![("(unknown)", 1), ("ONCA", 1), ("SCC", 2)]
        );
    }
}
