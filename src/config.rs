use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Root of the three parallel on-disk namespaces. Each session keys an
/// index directory, an uploads directory, and a history log file under
/// the same identifier.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn index_root(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn history_root(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn index_dir(&self, session: &str) -> PathBuf {
        self.index_root().join(session)
    }

    pub fn uploads_dir(&self, session: &str) -> PathBuf {
        self.uploads_root().join(session)
    }

    pub fn history_file(&self, session: &str) -> PathBuf {
        self.history_root().join(format!("{}.jsonl", session))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters. Tuned for retrieval context
    /// quality over raw splitting speed.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Characters of overlap carried between consecutive chunks.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Final number of chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidate pool multiplier for diversity re-ranking
    /// (`fetch_k = top_k * fetch_factor`).
    #[serde(default = "default_fetch_factor")]
    pub fetch_factor: usize,
    /// MMR relevance/diversity balance in [0, 1]; 1.0 is pure relevance.
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fetch_factor: default_fetch_factor(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

fn default_top_k() -> usize {
    8
}
fn default_fetch_factor() -> usize {
    4
}
fn default_mmr_lambda() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: default_ollama_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Generation is a single blocking call; this bounds it.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
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
    "127.0.0.1:7410".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.mmr_lambda) {
        anyhow::bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }
    match config.embedding.provider.as_str() {
        "ollama" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or disabled.",
            other
        ),
    }
    Ok(())
}

impl Config {
    /// Configuration rooted at an arbitrary data directory with all other
    /// settings defaulted. Used by the `init` command and tests.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig { data_dir },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let cfg = Config::with_data_dir(PathBuf::from("/tmp/d"));
        assert_eq!(cfg.chunking.chunk_chars, 1500);
        assert_eq!(cfg.chunking.overlap_chars, 300);
        assert_eq!(cfg.retrieval.top_k, 8);
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/var/lib/docchat"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.storage.history_file("alpha"),
            PathBuf::from("/var/lib/docchat/history/alpha.jsonl")
        );
        assert_eq!(cfg.embedding.provider, "ollama");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let mut cfg = Config::with_data_dir(PathBuf::from("/tmp/d"));
        cfg.chunking.overlap_chars = cfg.chunking.chunk_chars;
        assert!(validate(&cfg).is_err());
    }
}
