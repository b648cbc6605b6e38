// Embeddings module
// Text chunking plus the backends that turn chunks into vectors

pub mod chunking;
pub mod embedder;
pub mod hashing;
pub mod ollama;

pub use chunking::{Chunk, Chunker, ChunkingConfig, LengthUnit, split_sentences};
pub use embedder::{Embedder, EmbeddingBackend};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

use crate::Result;
use crate::config::{BackendKind, EmbeddingConfig};

/// The backend selected in configuration
#[derive(Debug, Clone)]
pub enum ConfiguredBackend {
    Ollama(OllamaClient),
    Hashing(HashingEmbedder),
}

impl ConfiguredBackend {
    #[inline]
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(match config.backend {
            BackendKind::Ollama => Self::Ollama(OllamaClient::new(config)?),
            BackendKind::Hashing => Self::Hashing(HashingEmbedder::new(
                config.embedding_dimension as usize,
            )),
        })
    }
}

impl EmbeddingBackend for ConfiguredBackend {
    #[inline]
    fn model_id(&self) -> &str {
        match self {
            Self::Ollama(client) => client.model_id(),
            Self::Hashing(hashing) => hashing.model_id(),
        }
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Ollama(client) => client.embed_batch(texts),
            Self::Hashing(hashing) => hashing.embed_batch(texts),
        }
    }
}
