
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::{ChunkingConfig, LengthUnit};
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_BASE_DIR_NAME: &str = ".complaint-rag";
const MAX_OVERLAP_SENTENCES: usize = 64;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which embedding backend builds and queries the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    /// Deterministic feature hashing, no server required
    Hashing,
}

impl std::fmt::Display for BackendKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Hashing => write!(f, "hashing"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: BackendKind,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    /// Upper bound on a single embedding batch, in seconds
    pub timeout_seconds: u64,
    /// Number of embedding batches in flight during a build
    pub parallelism: usize,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Ollama,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 32,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_seconds: 60,
            parallelism: 2,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Results per product for comparison queries
    pub k_per_product: usize,
    /// Metadata key that holds the product category
    pub filter_key: String,
    /// Index directory, relative to the base directory unless absolute
    pub vector_store_dir: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            k_per_product: 3,
            filter_key: "product".to_string(),
            vector_store_dir: PathBuf::from("vector_store"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid parallelism: {0} (must be between 1 and 32)")]
    InvalidParallelism(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid backend: {0} (must be 'ollama' or 'hashing')")]
    InvalidBackend(String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Invalid overlap: {0} sentences (must be less than 64)")]
    InvalidOverlap(usize),
    #[error("Invalid top k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid filter key: cannot be empty")]
    InvalidFilterKey,
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Defaults rooted at `base_dir`
    #[inline]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// `~/.complaint-rag`
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_BASE_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir.as_ref()));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        validate_chunking(&self.chunking)?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory the persisted index lives in
    #[inline]
    pub fn vector_store_path(&self) -> PathBuf {
        let dir = &self.retrieval.vector_store_dir;
        if dir.is_absolute() {
            dir.clone()
        } else {
            self.get_base_dir().join(dir)
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.embedding.ollama_url()
    }

    /// Apply one `section.field` assignment, validating it before anything changes
    #[inline]
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let embedding = &mut self.embedding;
        let retrieval = &mut self.retrieval;

        match key {
            "embedding.backend" => embedding.set_backend(value.parse()?),
            "embedding.protocol" => embedding.set_protocol(value.to_string())?,
            "embedding.host" => embedding.set_host(value.to_string())?,
            "embedding.port" => embedding.set_port(parse_value(key, value)?)?,
            "embedding.model" => embedding.set_model(value.to_string())?,
            "embedding.batch_size" => embedding.set_batch_size(parse_value(key, value)?)?,
            "embedding.embedding_dimension" => {
                embedding.set_embedding_dimension(parse_value(key, value)?)?;
            }
            "embedding.timeout_seconds" => {
                embedding.set_timeout_seconds(parse_value(key, value)?)?;
            }
            "embedding.parallelism" => embedding.set_parallelism(parse_value(key, value)?)?,
            "embedding.retry_attempts" => {
                embedding.set_retry_attempts(parse_value(key, value)?)?;
            }
            "chunking.chunk_size" | "chunking.overlap" | "chunking.unit" => {
                let mut chunking = self.chunking.clone();
                match key {
                    "chunking.chunk_size" => chunking.chunk_size = parse_value(key, value)?,
                    "chunking.overlap" => chunking.overlap = parse_value(key, value)?,
                    _ => chunking.unit = parse_unit(key, value)?,
                }
                validate_chunking(&chunking)?;
                self.chunking = chunking;
            }
            "retrieval.default_top_k" => retrieval.set_default_top_k(parse_value(key, value)?)?,
            "retrieval.k_per_product" => retrieval.set_k_per_product(parse_value(key, value)?)?,
            "retrieval.filter_key" => retrieval.set_filter_key(value.to_string())?,
            "retrieval.vector_store_dir" => {
                if value.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                retrieval.vector_store_dir = PathBuf::from(value);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        Ok(())
    }
}

fn validate_chunking(config: &ChunkingConfig) -> Result<(), ConfigError> {
    if config.chunk_size == 0 {
        return Err(ConfigError::InvalidChunkSize(config.chunk_size));
    }

    if config.overlap >= MAX_OVERLAP_SENTENCES {
        return Err(ConfigError::InvalidOverlap(config.overlap));
    }

    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_unit(key: &str, value: &str) -> Result<LengthUnit, ConfigError> {
    match value {
        "characters" => Ok(LengthUnit::Characters),
        "words" => Ok(LengthUnit::Words),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(8..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=32).contains(&self.parallelism) {
            return Err(ConfigError::InvalidParallelism(self.parallelism));
        }

        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_backend(&mut self, backend: BackendKind) {
        self.backend = backend;
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let candidate = EmbeddingConfig {
            host: host.clone(),
            ..self.clone()
        };
        candidate.ollama_url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(8..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }

    #[inline]
    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(timeout_seconds));
        }
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }

    #[inline]
    pub fn set_parallelism(&mut self, parallelism: usize) -> Result<(), ConfigError> {
        if !(1..=32).contains(&parallelism) {
            return Err(ConfigError::InvalidParallelism(parallelism));
        }
        self.parallelism = parallelism;
        Ok(())
    }

    #[inline]
    pub fn set_retry_attempts(&mut self, retry_attempts: u32) -> Result<(), ConfigError> {
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(retry_attempts));
        }
        self.retry_attempts = retry_attempts;
        Ok(())
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.default_top_k) {
            return Err(ConfigError::InvalidTopK(self.default_top_k));
        }
        if !(1..=1000).contains(&self.k_per_product) {
            return Err(ConfigError::InvalidTopK(self.k_per_product));
        }
        if self.filter_key.trim().is_empty() {
            return Err(ConfigError::InvalidFilterKey);
        }
        Ok(())
    }

    #[inline]
    pub fn set_default_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.default_top_k = top_k;
        Ok(())
    }

    #[inline]
    pub fn set_k_per_product(&mut self, k: usize) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&k) {
            return Err(ConfigError::InvalidTopK(k));
        }
        self.k_per_product = k;
        Ok(())
    }

    #[inline]
    pub fn set_filter_key(&mut self, key: String) -> Result<(), ConfigError> {
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidFilterKey);
        }
        self.filter_key = key;
        Ok(())
    }
}
