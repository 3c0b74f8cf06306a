use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/vector_store.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in word tokens.
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    /// Tokens shared between consecutive windows.
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_chunk_words() -> usize {
    220
}
fn default_overlap_words() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum results returned per query (applied after ranking).
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Character cap for display snippets.
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

fn default_max_results() -> usize {
    10
}
fn default_snippet_max_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Texts per provider call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Batches in flight at once during ingestion.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_batches: default_max_concurrent_batches(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_batches() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking. Note: overlap_words >= chunk_words is legal (the
    // chunker degenerates to a one-token step), so it is not rejected here.
    if config.chunking.chunk_words == 0 {
        anyhow::bail!("chunking.chunk_words must be > 0");
    }

    // Validate retrieval
    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if config.retrieval.snippet_max_chars < 1 {
        anyhow::bail!("retrieval.snippet_max_chars must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
/// Lets `caselens ingest --input …` work without a config file on disk.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.chunking.chunk_words, 220);
        assert_eq!(cfg.chunking.overlap_words, 40);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.batch_size, 16);
        assert_eq!(cfg.retrieval.max_results, 10);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_minimal_file_parses() {
        let f = write_config("[chunking]\nchunk_words = 100\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_words, 100);
        assert_eq!(cfg.chunking.overlap_words, 40);
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let f = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        let cfg = load_config(f.path()).unwrap();
        assert!(cfg.embedding.is_enabled());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let f = write_config("[embedding]\nprovider = \"quantum\"\nmodel = \"m\"\ndims = 4\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_degenerate_overlap_not_rejected() {
        let f = write_config("[chunking]\nchunk_words = 10\noverlap_words = 10\n");
        assert!(load_config(f.path()).is_ok());
    }

    #[test]
    fn test_zero_chunk_words_rejected() {
        let f = write_config("[chunking]\nchunk_words = 0\n");
        assert!(load_config(f.path()).is_err());
    }
}
