//! Query pipeline: filter, score, rank, and format search results.
//!
//! The pipeline over one store snapshot is fixed:
//!
//! ```text
//! query vector ──▶ filter chunks ──▶ cosine score ──▶ best chunk per
//! case ──▶ sort desc ──▶ truncate to max_results ──▶ join case meta
//! ```
//!
//! Filtering happens before scoring so excluded chunks never pay for a
//! similarity computation, and the per-case aggregation sees only
//! admissible chunks. Truncation happens only after the full sort, so the
//! top-K is the true global top-K.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::config::Config;
use crate::embedding::{self, cosine_similarity};
use crate::models::{CaseResult, ScoredChunk, SearchFilters, StoreChunk};
use crate::store::{self, StoreSnapshot};

/// Ranked results plus how many chunks survived the metadata filter.
pub struct QueryOutcome {
    pub results: Vec<CaseResult>,
    pub total_candidates: usize,
}

/// Build normalized filters from raw caller input.
///
/// Keywords are lower-cased and trimmed, with empty entries dropped; a
/// blank court collapses to no court clause. Court text is otherwise
/// kept verbatim (comparison ignores case).
pub fn build_filters(
    year_from: Option<i32>,
    year_to: Option<i32>,
    court: Option<String>,
    keywords: Vec<String>,
) -> SearchFilters {
    SearchFilters {
        year_from,
        year_to,
        court: court
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        keywords: keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect(),
    }
}

/// Whether a chunk passes every active filter clause (AND semantics).
///
/// A chunk with no `year` fails any year-bounded query: an unknown year
/// cannot satisfy an explicit range. Court comparison is
/// case-insensitive exact match; keywords are literal substrings of the
/// lower-cased chunk text, all required.
pub fn matches_filters(chunk: &StoreChunk, filters: &SearchFilters) -> bool {
    if filters.year_from.is_some() || filters.year_to.is_some() {
        let Some(year) = chunk.year else {
            return false;
        };
        if let Some(from) = filters.year_from {
            if year < from {
                return false;
            }
        }
        if let Some(to) = filters.year_to {
            if year > to {
                return false;
            }
        }
    }

    if let Some(wanted) = &filters.court {
        let court = chunk.court.as_deref().unwrap_or_default();
        if !court.eq_ignore_ascii_case(wanted) {
            return false;
        }
    }

    if !filters.keywords.is_empty() {
        let haystack = chunk.text.to_lowercase();
        if !filters.keywords.iter().all(|k| haystack.contains(k.as_str())) {
            return false;
        }
    }

    true
}

/// Score every admissible chunk against the query vector.
pub fn score_chunks<'a>(
    chunks: &'a [StoreChunk],
    query_vec: &[f32],
    filters: &SearchFilters,
) -> Vec<ScoredChunk<'a>> {
    chunks
        .iter()
        .filter(|chunk| matches_filters(chunk, filters))
        .map(|chunk| ScoredChunk {
            chunk,
            score: cosine_similarity(query_vec, &chunk.embedding),
        })
        .collect()
}

/// Collapse scored chunks to the best chunk per case, sort by score
/// descending, and keep the top `max_results`.
///
/// Within a case, a later chunk replaces the incumbent only on a strictly
/// greater score, so the earliest chunk wins ties. Across cases the sort
/// is stable over first-encounter order, so equal-scored cases keep store
/// order.
pub fn rank<'a>(scored: Vec<ScoredChunk<'a>>, max_results: usize) -> Vec<ScoredChunk<'a>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut best: Vec<ScoredChunk<'a>> = Vec::new();

    for candidate in scored {
        match index.get(candidate.chunk.case_id.as_str()) {
            Some(&slot) => {
                if candidate.score > best[slot].score {
                    best[slot] = candidate;
                }
            }
            None => {
                index.insert(candidate.chunk.case_id.as_str(), best.len());
                best.push(candidate);
            }
        }
    }

    best.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    best.truncate(max_results);
    best
}

/// Truncate text to at most `max_chars` characters for display.
///
/// Text at or under the cap is returned verbatim (no ellipsis). Longer
/// text is cut at a character boundary, trailing whitespace trimmed, and
/// an ellipsis appended.
pub fn make_snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

/// Round a similarity score to four decimals for display. The full
/// precision value still drives ranking; only the rendered number is
/// rounded. NaN renders as 0.
pub fn display_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    (score * 10_000.0).round() / 10_000.0
}

/// Join a ranked chunk back to its case registry entry.
///
/// A chunk whose case is missing from the registry (possible only in a
/// store that bypassed validation) still renders, with the chunk's own
/// denormalized fields and a placeholder title.
pub fn format_result(
    scored: &ScoredChunk<'_>,
    snapshot: &StoreSnapshot,
    snippet_max_chars: usize,
) -> CaseResult {
    let chunk = scored.chunk;
    let snippet = make_snippet(&chunk.text, snippet_max_chars);
    let score = display_score(scored.score);

    match snapshot.case_by_id(&chunk.case_id) {
        Some(case) => CaseResult {
            id: case.id.clone(),
            title: case
                .title
                .clone()
                .unwrap_or_else(|| "Untitled case".to_string()),
            citation: case.citation.clone(),
            court: case.court.clone(),
            year: case.year,
            url: case.url.clone(),
            snippet,
            score,
        },
        None => CaseResult {
            id: chunk.case_id.clone(),
            title: chunk
                .title
                .clone()
                .unwrap_or_else(|| "Untitled case".to_string()),
            citation: chunk.citation.clone(),
            court: chunk.court.clone(),
            year: chunk.year,
            url: chunk.url.clone(),
            snippet,
            score,
        },
    }
}

/// Run the full pipeline against one snapshot.
pub fn query_snapshot(
    snapshot: &StoreSnapshot,
    query_vec: &[f32],
    filters: &SearchFilters,
    max_results: usize,
    snippet_max_chars: usize,
) -> QueryOutcome {
    let scored = score_chunks(&snapshot.store.chunks, query_vec, filters);
    let total_candidates = scored.len();
    let ranked = rank(scored, max_results);
    let results = ranked
        .iter()
        .map(|s| format_result(s, snapshot, snippet_max_chars))
        .collect();
    QueryOutcome {
        results,
        total_candidates,
    }
}

/// `caselens search` — embed the query, score the store, print results.
pub async fn run_search(
    config: &Config,
    query: &str,
    year_from: Option<i32>,
    year_to: Option<i32>,
    court: Option<String>,
    keywords: Vec<String>,
    limit: Option<usize>,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Query text must not be empty");
    }
    if !config.embedding.is_enabled() {
        bail!("Embeddings are disabled; set embedding.provider in the config to search");
    }

    let store = match store::load_store(&config.store.path)? {
        Some(store) => store,
        None => bail!(
            "No vector store at {}. Run `caselens ingest` first.",
            config.store.path.display()
        ),
    };

    let provider = embedding::create_provider(&config.embedding)?;
    if store.model != provider.model_name() {
        eprintln!(
            "Warning: store was built with model '{}' but queries use '{}'; scores may be meaningless",
            store.model,
            provider.model_name()
        );
    }

    let query_vec = embedding::embed_query(provider.as_ref(), query).await?;
    let filters = build_filters(year_from, year_to, court, keywords);
    let max_results = limit.unwrap_or(config.retrieval.max_results);

    let snapshot = StoreSnapshot::new(store);
    let outcome = query_snapshot(
        &snapshot,
        &query_vec,
        &filters,
        max_results,
        config.retrieval.snippet_max_chars,
    );

    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{} result(s) from {} candidate chunk(s):\n",
        outcome.results.len(),
        outcome.total_candidates
    );
    for (i, result) in outcome.results.iter().enumerate() {
        let mut line = format!("{}. {} ({:.4})", i + 1, result.title, result.score);
        if let Some(citation) = &result.citation {
            line.push_str(&format!(" — {}", citation));
        }
        println!("{}", line);
        match (&result.court, result.year) {
            (Some(court), Some(year)) => println!("   {} · {}", court, year),
            (Some(court), None) => println!("   {}", court),
            (None, Some(year)) => println!("   {}", year),
            (None, None) => {}
        }
        if let Some(url) = &result.url {
            println!("   {}", url);
        }
        println!("   {}\n", result.snippet);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseMeta, VectorStore};
    use chrono::Utc;

    fn chunk(case_id: &str, ordinal: usize, text: &str, embedding: Vec<f32>) -> StoreChunk {
        StoreChunk {
            id: format!("{}::{}", case_id, ordinal),
            case_id: case_id.to_string(),
            title: None,
            citation: None,
            court: Some("SCC".to_string()),
            year: Some(2019),
            url: None,
            text: text.to_string(),
            embedding,
        }
    }

    fn filters() -> SearchFilters {
        SearchFilters::default()
    }

    #[test]
    fn test_filters_inactive_by_default() {
        let c = chunk("c1", 1, "duty of care analysis", vec![1.0]);
        assert!(matches_filters(&c, &filters()));
    }

    #[test]
    fn test_year_range_filter() {
        let c = chunk("c1", 1, "text", vec![1.0]);

        let mut f = filters();
        f.year_from = Some(2019);
        f.year_to = Some(2020);
        assert!(matches_filters(&c, &f));

        f.year_from = Some(2020);
        assert!(!matches_filters(&c, &f));

        f.year_from = None;
        f.year_to = Some(2018);
        assert!(!matches_filters(&c, &f));
    }

    #[test]
    fn test_missing_year_fails_year_bounded_query() {
        let mut c = chunk("c1", 1, "text", vec![1.0]);
        c.year = None;
        let mut f = filters();
        f.year_from = Some(1990);
        assert!(!matches_filters(&c, &f));
        // Inactive year clauses ignore the missing field.
        assert!(matches_filters(&c, &filters()));
    }

    #[test]
    fn test_court_filter_case_insensitive() {
        let c = chunk("c1", 1, "text", vec![1.0]);
        let mut f = filters();
        f.court = Some("scc".to_string());
        assert!(matches_filters(&c, &f));
        f.court = Some("ONCA".to_string());
        assert!(!matches_filters(&c, &f));
    }

    #[test]
    fn test_missing_court_fails_court_filter() {
        let mut c = chunk("c1", 1, "text", vec![1.0]);
        c.court = None;
        let mut f = filters();
        f.court = Some("SCC".to_string());
        assert!(!matches_filters(&c, &f));
    }

    #[test]
    fn test_keywords_are_anded_substrings() {
        let c = chunk("c1", 1, "The duty of care owed to the plaintiff", vec![1.0]);
        let mut f = filters();
        f.keywords = vec!["duty".to_string(), "plaintiff".to_string()];
        assert!(matches_filters(&c, &f));
        f.keywords.push("negligence".to_string());
        assert!(!matches_filters(&c, &f));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive_on_text() {
        let c = chunk("c1", 1, "DUTY of Care", vec![1.0]);
        let f = build_filters(None, None, None, vec!["Duty".to_string()]);
        assert!(matches_filters(&c, &f));
    }

    #[test]
    fn test_build_filters_normalizes_keywords() {
        let f = build_filters(
            None,
            None,
            None,
            vec!["  Duty ".to_string(), "".to_string(), "  ".to_string()],
        );
        assert_eq!(f.keywords, vec!["duty".to_string()]);
    }

    #[test]
    fn test_build_filters_drops_blank_court() {
        let f = build_filters(None, None, Some("  ".to_string()), vec![]);
        assert!(f.court.is_none());
    }

    #[test]
    fn test_rank_best_chunk_per_case() {
        let c1a = chunk("A", 1, "a1", vec![1.0]);
        let c1b = chunk("A", 2, "a2", vec![1.0]);
        let c2 = chunk("B", 1, "b1", vec![1.0]);
        let scored = vec![
            ScoredChunk { chunk: &c1a, score: 0.90 },
            ScoredChunk { chunk: &c1b, score: 0.95 },
            ScoredChunk { chunk: &c2, score: 0.80 },
        ];

        let ranked = rank(scored, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.case_id, "A");
        assert_eq!(ranked[0].chunk.id, "A::2");
        assert!((ranked[0].score - 0.95).abs() < 1e-12);
        assert_eq!(ranked[1].chunk.case_id, "B");
    }

    #[test]
    fn test_rank_first_chunk_wins_ties_within_case() {
        let c1a = chunk("A", 1, "a1", vec![1.0]);
        let c1b = chunk("A", 2, "a2", vec![1.0]);
        let scored = vec![
            ScoredChunk { chunk: &c1a, score: 0.5 },
            ScoredChunk { chunk: &c1b, score: 0.5 },
        ];
        let ranked = rank(scored, 10);
        assert_eq!(ranked[0].chunk.id, "A::1");
    }

    #[test]
    fn test_rank_truncates_after_sorting() {
        let ca = chunk("A", 1, "a", vec![1.0]);
        let cb = chunk("B", 1, "b", vec![1.0]);
        let cc = chunk("C", 1, "c", vec![1.0]);
        let scored = vec![
            ScoredChunk { chunk: &ca, score: 0.1 },
            ScoredChunk { chunk: &cb, score: 0.9 },
            ScoredChunk { chunk: &cc, score: 0.5 },
        ];
        let ranked = rank(scored, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.case_id, "B");
        assert_eq!(ranked[1].chunk.case_id, "C");
    }

    #[test]
    fn test_rank_equal_cases_keep_store_order() {
        let ca = chunk("A", 1, "a", vec![1.0]);
        let cb = chunk("B", 1, "b", vec![1.0]);
        let scored = vec![
            ScoredChunk { chunk: &ca, score: 0.7 },
            ScoredChunk { chunk: &cb, score: 0.7 },
        ];
        let ranked = rank(scored, 10);
        assert_eq!(ranked[0].chunk.case_id, "A");
        assert_eq!(ranked[1].chunk.case_id, "B");
    }

    #[test]
    fn test_snippet_at_under_and_over_cap() {
        assert_eq!(make_snippet("abcd", 5), "abcd");
        assert_eq!(make_snippet("abcde", 5), "abcde");
        assert_eq!(make_snippet("abcdef", 5), "abcde…");
        // Trailing whitespace at the cut point is trimmed before the
        // ellipsis.
        assert_eq!(make_snippet("abcd  efgh", 6), "abcd…");
    }

    #[test]
    fn test_snippet_counts_characters_not_bytes() {
        let text = "ééééé plus more text beyond";
        let snippet = make_snippet(text, 5);
        assert_eq!(snippet, "ééééé…");
    }

    #[test]
    fn test_display_score() {
        assert_eq!(display_score(0.123_456_7), 0.1235);
        assert_eq!(display_score(1.0), 1.0);
        assert_eq!(display_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_query_snapshot_end_to_end() {
        let cases = vec![
            CaseMeta {
                id: "c1".to_string(),
                title: Some("Crown v. Example".to_string()),
                citation: Some("2019 SCC 1".to_string()),
                court: Some("SCC".to_string()),
                year: Some(2019),
                url: None,
            },
            CaseMeta {
                id: "c2".to_string(),
                title: None,
                citation: None,
                court: Some("ONCA".to_string()),
                year: Some(2005),
                url: None,
            },
        ];
        let chunks = vec![
            StoreChunk {
                id: "c1::1".to_string(),
                case_id: "c1".to_string(),
                title: None,
                citation: None,
                court: Some("SCC".to_string()),
                year: Some(2019),
                url: None,
                text: "the duty of care owed".to_string(),
                embedding: vec![1.0, 0.0],
            },
            StoreChunk {
                id: "c2::1".to_string(),
                case_id: "c2".to_string(),
                title: None,
                citation: None,
                court: Some("ONCA".to_string()),
                year: Some(2005),
                url: None,
                text: "an unrelated contract dispute".to_string(),
                embedding: vec![0.0, 1.0],
            },
        ];
        let snapshot = StoreSnapshot::new(VectorStore {
            model: "m".to_string(),
            generated_at: Utc::now(),
            chunk_words: 220,
            chunk_overlap: 40,
            chunk_count: 2,
            cases,
            chunks,
        });

        let outcome = query_snapshot(&snapshot, &[1.0, 0.0], &filters(), 10, 300);
        assert_eq!(outcome.total_candidates, 2);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].id, "c1");
        assert_eq!(outcome.results[0].title, "Crown v. Example");
        assert!((outcome.results[0].score - 1.0).abs() < 1e-9);
        assert_eq!(outcome.results[1].title, "Untitled case");

        // Court filter drops the ONCA chunk from candidates entirely.
        let f = build_filters(None, None, Some("SCC".to_string()), vec![]);
        let outcome = query_snapshot(&snapshot, &[1.0, 0.0], &f, 10, 300);
        assert_eq!(outcome.total_candidates, 1);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].id, "c1");
    }
}
