#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use super::persistence::{self, IndexExpectation, IndexManifest};
use super::{MetadataFilter, SearchHit, VectorIndex};
use crate::embeddings::Chunk;
use crate::{Result, RetrievalError};

/// Brute-force index scoring every entry on each query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: Option<usize>,
    /// Row-major, `dimension` floats per entry
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl FlatIndex {
    /// Empty index that takes its dimension from the first insert
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble an index from raw parts, checking they agree
    #[inline]
    pub fn from_parts(dimension: usize, vectors: Vec<f32>, chunks: Vec<Chunk>) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrievalError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if vectors.len() % dimension != 0 || vectors.len() / dimension != chunks.len() {
            return Err(RetrievalError::LengthMismatch {
                vectors: vectors.len() / dimension,
                metadata: chunks.len(),
            });
        }
        Ok(Self {
            dimension: Some(dimension),
            vectors,
            chunks,
        })
    }

    /// Stored vector at `slot`
    #[inline]
    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        self.vectors
            .get(slot * dimension..(slot + 1) * dimension)
    }

    fn check_query(&self, query: &[f32]) -> Result<Option<usize>> {
        match self.dimension {
            Some(dimension) if dimension != query.len() => Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            }),
            dimension => Ok(dimension),
        }
    }

    fn score(&self, dimension: usize, slot: usize, query: &[f32]) -> f32 {
        let row = &self.vectors[slot * dimension..(slot + 1) * dimension];
        let score: f32 = row.iter().zip(query).map(|(a, b)| a * b).sum();
        // -0.0 + 0.0 is +0.0, so equal scores compare equal under total_cmp
        score + 0.0
    }

    fn hits(&self, mut scored: Vec<(usize, f32)>, k: usize) -> Vec<SearchHit> {
        if k < scored.len() {
            scored.select_nth_unstable_by(k, rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank);

        scored
            .into_iter()
            .map(|(slot, score)| SearchHit {
                slot,
                score,
                chunk: self.chunks[slot].clone(),
            })
            .collect()
    }
}

/// Descending score, then ascending slot
fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

impl VectorIndex for FlatIndex {
    #[inline]
    fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    fn add(&mut self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<Range<usize>> {
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::LengthMismatch {
                vectors: vectors.len(),
                metadata: chunks.len(),
            });
        }

        let start = self.len();
        let Some(first) = vectors.first() else {
            return Ok(start..start);
        };

        let dimension = self.dimension.unwrap_or(first.len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension || v.is_empty()) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dimension);
        self.vectors.reserve(vectors.len() * dimension);
        for vector in &vectors {
            self.vectors.extend_from_slice(vector);
        }
        self.chunks.extend(chunks);

        debug!("Added {} entries at slots {}..{}", vectors.len(), start, self.len());
        Ok(start..self.len())
    }

    #[inline]
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(dimension) = self.check_query(query)? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let scored = (0..self.len())
            .map(|slot| (slot, self.score(dimension, slot, query)))
            .collect();

        Ok(self.hits(scored, k))
    }

    #[inline]
    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        let Some(dimension) = self.check_query(query)? else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::new();
        for (slot, chunk) in self.chunks.iter().enumerate() {
            let value = chunk.metadata.get(&filter.key).ok_or_else(|| {
                RetrievalError::MissingMetadataKey {
                    key: filter.key.clone(),
                    slot,
                }
            })?;
            if *value == filter.value {
                scored.push((slot, self.score(dimension, slot, query)));
            }
        }

        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(self.hits(scored, k))
    }

    #[inline]
    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    fn save(&self, dir: &Path, expectation: &IndexExpectation) -> Result<IndexManifest> {
        let dimension = self.dimension.unwrap_or(expectation.dimension);
        if dimension != expectation.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: expectation.dimension,
                actual: dimension,
            });
        }
        persistence::save(dir, expectation, &self.vectors, &self.chunks)
    }

    #[inline]
    fn load(dir: &Path, expectation: &IndexExpectation) -> Result<Self> {
        let stored = persistence::load(dir, expectation)?;
        Self::from_parts(stored.manifest.dimension, stored.vectors, stored.chunks).map_err(|e| {
            RetrievalError::CorruptPersistedState {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }
}
