//! TOML configuration.
//!
//! Everything the pipeline needs (storage paths, chunk parameters, provider
//! models and credentials) is read once at startup into [`Config`] and passed
//! explicitly to the components that use it.
//!
//! Provider API keys may be given inline (`api_key`); otherwise they are read
//! from the provider's environment variable during [`load_config`] and never
//! looked up again.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound on `max_retries` for either provider.
pub const MAX_RETRIES_LIMIT: u32 = 10;
/// Upper bound on `timeout_secs` for either provider.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one index blob per document.
    pub index_root: PathBuf,
    /// Directory uploaded PDFs are copied into.
    pub upload_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Model name, falling back to the provider's default.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "ollama" => "nomic-embed-text",
                "gemini" => "text-embedding-004",
                "local" => "all-minilm-l6-v2",
                _ => "text-embedding-3-small",
            }
            .to_string()
        })
    }

    /// Vector dimensionality, falling back to the known size of the model.
    pub fn dims_or_default(&self) -> Option<usize> {
        self.dims.or_else(|| known_embedding_dims(&self.model_or_default()))
    }
}

/// Dimensionality of well-known embedding models.
pub fn known_embedding_dims(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-004" | "embedding-001" | "models/embedding-001" => Some(768),
        "nomic-embed-text" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => Some(384),
        "bge-base-en-v1.5" | "multilingual-e5-base" => Some(768),
        "bge-large-en-v1.5" | "multilingual-e5-large" => Some(1024),
        _ => None,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_key: None,
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl GenerationConfig {
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "ollama" => "llama3.1",
                "gemini" => "gemini-1.5-flash",
                _ => "gpt-4o-mini",
            }
            .to_string()
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_mb() -> usize {
    50
}

/// Environment variable holding the API key for a provider, if it needs one.
fn api_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        _ => None,
    }
}

fn resolve_api_key(provider: &str, configured: &mut Option<String>) {
    if configured.is_some() {
        return;
    }
    if let Some(var) = api_key_env(provider) {
        *configured = std::env::var(var).ok().filter(|k| !k.is_empty());
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    resolve_api_key(&config.embedding.provider, &mut config.embedding.api_key);
    resolve_api_key(&config.generation.provider, &mut config.generation.api_key);
    Ok(config)
}

/// Parse and validate config text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "gemini" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, gemini, or local.",
            other
        ),
    }
    check_call_limits(
        "embedding",
        config.embedding.max_retries,
        config.embedding.timeout_secs,
    )?;
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.dims_or_default() {
        Some(0) => bail!("embedding.dims must be > 0"),
        Some(_) => {}
        None => bail!(
            "embedding.dims must be set for model '{}'",
            config.embedding.model_or_default()
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "openai" | "ollama" | "gemini" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be openai, ollama, or gemini.",
            other
        ),
    }
    check_call_limits(
        "generation",
        config.generation.max_retries,
        config.generation.timeout_secs,
    )?;

    Ok(config)
}

fn check_call_limits(section: &str, max_retries: u32, timeout_secs: u64) -> Result<()> {
    if max_retries > MAX_RETRIES_LIMIT {
        bail!(
            "{}.max_retries must be <= {} (got {})",
            section,
            MAX_RETRIES_LIMIT,
            max_retries
        );
    }
    if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
        bail!(
            "{}.timeout_secs must be in 1..={} (got {})",
            section,
            MAX_TIMEOUT_SECS,
            timeout_secs
        );
    }
    Ok(())
}
