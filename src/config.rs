//! TOML configuration.
//!
//! Every section is optional; omitted keys take the defaults below, so an
//! empty file (or no file at the default path) yields a working
//! Ollama-backed setup.
//!
//! ```toml
//! [chunking]
//! chunk_size = 2000
//! overlap = 200
//!
//! [retrieval]
//! k = 5
//! search_type = "similarity"
//! # max_context_chars = 8000
//!
//! [embedding]
//! provider = "ollama"        # ollama | openai | hash | local
//! model = "mxbai-embed-large"
//! url = "http://localhost:11434"
//! batch_size = 32
//! max_retries = 3
//! timeout_secs = 60
//!
//! [generation]
//! provider = "ollama"        # ollama | openai | disabled
//! model = "llama3.1"
//! timeout_secs = 300
//!
//! [index]
//! mode = "memory"            # memory | durable
//! path = "./db"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{bail, Context, Result};
use docrag_core::chunk::{ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use docrag_core::retrieve::{RetrievalParams, SearchType, DEFAULT_K};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docrag.toml";

pub const OLLAMA_URL: &str = "http://localhost:11434";
pub const OPENAI_URL: &str = "https://api.openai.com";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_search_type")]
    pub search_type: String,
    /// Upper bound on prompt context length; whole chunks are dropped to fit.
    #[serde(default)]
    pub max_context_chars: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            search_type: default_search_type(),
            max_context_chars: None,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}
fn default_search_type() -> String {
    "similarity".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected vector length. Checked against every response when set.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL; defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    60
}

impl EmbeddingConfig {
    /// Base URL for the configured provider.
    pub fn base_url(&self) -> &str {
        match (self.url.as_deref(), self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, "openai") => OPENAI_URL,
            (None, _) => OLLAMA_URL,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout(),
            temperature: None,
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "llama3.1".to_string()
}
fn default_generation_timeout() -> u64 {
    300
}

impl GenerationConfig {
    pub fn base_url(&self) -> &str {
        match (self.url.as_deref(), self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, "openai") => OPENAI_URL,
            (None, _) => OLLAMA_URL,
        }
    }
}

/// Where index entries live.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Ephemeral, owned by the running session.
    #[default]
    Memory,
    /// SQLite file under `index.path`, reset before every build.
    Durable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub mode: IndexMode,
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mode: IndexMode::default(),
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub k: Option<usize>,
    pub embedder: Option<String>,
}

impl Config {
    /// Apply CLI overrides and re-run validation.
    pub fn apply(mut self, overrides: &Overrides) -> Result<Self> {
        if let Some(size) = overrides.chunk_size {
            self.chunking.chunk_size = size;
        }
        if let Some(overlap) = overrides.overlap {
            self.chunking.overlap = overlap;
        }
        if let Some(k) = overrides.k {
            self.retrieval.k = k;
        }
        if let Some(provider) = &overrides.embedder {
            self.embedding.provider = provider.clone();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn chunk_params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(
            self.chunking.chunk_size,
            self.chunking.overlap,
        )?)
    }

    pub fn retrieval_params(&self) -> Result<RetrievalParams> {
        let search_type: SearchType = self.retrieval.search_type.parse()?;
        Ok(RetrievalParams::new(self.retrieval.k, search_type)?)
    }

    /// Reject anything that would fail later, before any work begins.
    pub fn validate(&self) -> Result<()> {
        self.chunk_params()
            .with_context(|| "Invalid [chunking] section")?;
        self.retrieval_params()
            .with_context(|| "Invalid [retrieval] section")?;

        if let Some(max) = self.retrieval.max_context_chars {
            // A budget below one full chunk could reject even the best match.
            if max < self.chunking.chunk_size {
                bail!(
                    "retrieval.max_context_chars ({}) must be at least chunking.chunk_size ({})",
                    max,
                    self.chunking.chunk_size
                );
            }
        }

        match self.embedding.provider.as_str() {
            "ollama" | "openai" | "hash" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be ollama, openai, hash, or local.",
                other
            ),
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.generation.provider.as_str() {
            "ollama" | "openai" | "disabled" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be ollama, openai, or disabled.",
                other
            ),
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("generation.temperature must be in [0.0, 2.0]");
            }
        }

        if self.index.mode == IndexMode::Durable && self.index.path.as_os_str().is_empty() {
            bail!("index.path must be set when index.mode is 'durable'");
        }

        Ok(())
    }
}

/// Load configuration from `path`.
///
/// With `explicit == false` a missing file means "use defaults"; when the
/// user named the file it must exist.
pub fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !path.exists() && !explicit {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
