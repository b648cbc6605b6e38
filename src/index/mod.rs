// Vector index: exact similarity search over embedded chunks

pub mod flat;
pub mod persistence;

use std::ops::Range;
use std::path::Path;

use crate::Result;
use crate::embeddings::Chunk;

pub use flat::FlatIndex;
pub use persistence::{IndexExpectation, IndexManifest};

/// An indexed chunk and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Insertion position of the entry
    pub slot: usize,
    /// Inner product with the query; cosine similarity for unit vectors
    pub score: f32,
    pub chunk: Chunk,
}

/// Exact match on one metadata key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
}

impl MetadataFilter {
    #[inline]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Append-only store of `(vector, chunk)` entries with top-k search.
///
/// Vectors are expected to be unit length already; the index scores with a
/// plain inner product and never normalizes. Results are ordered by
/// descending score, ties broken by ascending slot.
pub trait VectorIndex: Send + Sync + Sized {
    /// Empty index whose dimension is fixed up front
    fn with_dimension(dimension: usize) -> Self;

    /// `None` until the dimension is fixed by construction or the first insert
    fn dimension(&self) -> Option<usize>;

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append entries, returning the slots they were assigned.
    ///
    /// Validates everything before mutating, so a failed call leaves the index unchanged.
    fn add(&mut self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<Range<usize>>;

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Top `k` among entries whose metadata matches `filter`.
    ///
    /// Every entry is scanned; an entry without the filter key is an error.
    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Chunks in slot order
    fn chunks(&self) -> &[Chunk];

    /// Persist the index as a unit, validating it against `expectation` first
    fn save(&self, dir: &Path, expectation: &IndexExpectation) -> Result<IndexManifest>;

    /// Restore an index saved with a compatible configuration
    fn load(dir: &Path, expectation: &IndexExpectation) -> Result<Self>;
}
