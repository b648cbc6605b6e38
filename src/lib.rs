use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::retrieval::ServiceStatus;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Retrieval service is not ready (current state: {state})")]
    NotInitialized { state: ServiceStatus },

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Length mismatch: {vectors} vectors but {metadata} metadata entries")]
    LengthMismatch { vectors: usize, metadata: usize },

    #[error("Corrupt persisted index at {}: {reason}", path.display())]
    CorruptPersistedState { path: PathBuf, reason: String },

    #[error("Embedding backend error: {0}")]
    EmbeddingBackend(String),

    #[error("Metadata key '{key}' is missing from the entry at slot {slot}")]
    MissingMetadataKey { key: String, slot: usize },

    #[error("Index build was cancelled")]
    Cancelled,

    #[error("Document source error: {0}")]
    DocumentSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RetrievalError {
    /// Whether the persisted index should be discarded and rebuilt from source documents
    #[inline]
    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, Self::CorruptPersistedState { .. })
    }
}

pub mod commands;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod retrieval;
pub mod sampling;
