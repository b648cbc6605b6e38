
use tracing::debug;

use crate::{Result, RetrievalError};

/// A model that turns text into dense vectors.
///
/// Backends may block; the retrieval service runs them on the blocking pool.
/// Output does not need to be normalized, [`Embedder`] takes care of that.
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier of the underlying model, recorded in the index manifest
    fn model_id(&self) -> &str;

    /// Embed every text in `texts`, returning one vector per input in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Batches input through a backend and L2-normalizes the output
#[derive(Debug, Clone)]
pub struct Embedder<B> {
    backend: B,
    batch_size: usize,
    dimension: usize,
}

impl<B: EmbeddingBackend> Embedder<B> {
    #[inline]
    pub fn new(backend: B, batch_size: usize, dimension: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            dimension,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed all `texts`, `batch_size` at a time.
    ///
    /// Fails as a whole if any batch fails; no partial output is returned.
    #[inline]
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch)?);
        }
        Ok(vectors)
    }

    /// Embed a single query string
    #[inline]
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| {
            RetrievalError::EmbeddingBackend("Backend returned no vector for query".to_string())
        })
    }

    /// Embed exactly one batch, validating count and dimension before normalizing
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding batch of {} texts with {}",
            texts.len(),
            self.model_id()
        );

        let raw = self.backend.embed_batch(texts)?;

        if raw.len() != texts.len() {
            return Err(RetrievalError::EmbeddingBackend(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                raw.len()
            )));
        }

        raw.into_iter()
            .map(|vector| {
                if vector.len() != self.dimension {
                    return Err(RetrievalError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                normalize(vector)
            })
            .collect()
    }
}

/// Scale `vector` to unit L2 norm
#[inline]
pub fn normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = l2_norm(&vector);
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(RetrievalError::EmbeddingBackend(format!(
            "Cannot normalize vector with norm {}",
            norm
        )));
    }
    for value in &mut vector {
        *value /= norm;
    }
    Ok(vector)
}

#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}
