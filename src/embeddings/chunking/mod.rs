
pub mod sentences;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::{Document, Metadata};

pub use sentences::split_sentences;

/// How chunk length is measured against `chunk_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Characters of the space-joined chunk text
    #[default]
    Characters,
    /// Whitespace separated words
    Words,
}

impl std::fmt::Display for LengthUnit {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Characters => write!(f, "characters"),
            Self::Words => write!(f, "words"),
        }
    }
}

/// Configuration for sentence-aware chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Length budget per chunk, in `unit`s
    pub chunk_size: usize,
    /// Number of trailing sentences repeated at the start of the next chunk
    pub overlap: usize,
    pub unit: LengthUnit,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 1,
            unit: LengthUnit::Characters,
        }
    }
}

/// A contiguous run of whole sentences from one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sentences joined by single spaces
    pub text: String,
    /// Copy of the parent document's metadata
    pub metadata: Metadata,
    /// Position of this chunk within its parent
    pub chunk_index: usize,
    /// Number of chunks the parent was split into
    pub total_chunks: usize,
    /// Index of the first sentence of this chunk within the parent
    pub sentence_start: usize,
    pub sentence_count: usize,
}

impl Chunk {
    #[inline]
    pub fn sentence_range(&self) -> std::ops::Range<usize> {
        self.sentence_start..self.sentence_start + self.sentence_count
    }
}

/// Splits documents into bounded, sentence-aligned chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    #[inline]
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.text, &document.metadata)
    }

    /// Chunk `text`, copying `metadata` onto every chunk.
    ///
    /// Sentences are accumulated greedily while the chunk stays within
    /// `chunk_size`. When the next sentence would overflow, the chunk is closed
    /// and the next one is seeded with its last `overlap` sentences. A sentence
    /// longer than the budget is never split.
    #[inline]
    pub fn chunk(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let spans = self.plan_spans(&sentences);
        let total_chunks = spans.len();

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| Chunk {
                text: sentences[span.clone()].join(" "),
                metadata: metadata.clone(),
                chunk_index,
                total_chunks,
                sentence_start: span.start,
                sentence_count: span.len(),
            })
            .collect();

        debug!(
            "Chunked {} sentences into {} chunks (chunk_size={} {}, overlap={})",
            sentences.len(),
            chunks.len(),
            self.config.chunk_size,
            self.config.unit,
            self.config.overlap
        );

        chunks
    }

    /// Sentence index ranges for each chunk
    fn plan_spans(&self, sentences: &[String]) -> Vec<std::ops::Range<usize>> {
        let lengths: Vec<usize> = sentences
            .iter()
            .map(|s| measure(s, self.config.unit))
            .collect();

        let mut spans = Vec::new();
        let mut start = 0;
        let mut length = 0;
        // Sentences in the open chunk that were not carried over as overlap
        let mut fresh = 0;

        for (i, &sentence_length) in lengths.iter().enumerate() {
            if fresh > 0 && length + self.cost(sentence_length, i > start) > self.config.chunk_size {
                spans.push(start..i);

                let seed = self.config.overlap.min(i - start);
                start = i - seed;
                length = self.joined_length(&lengths[start..i]);
                fresh = 0;
            }

            length += self.cost(sentence_length, i > start);
            fresh += 1;
        }

        spans.push(start..sentences.len());
        spans
    }

    fn cost(&self, sentence_length: usize, has_previous: bool) -> usize {
        match self.config.unit {
            LengthUnit::Characters if has_previous => sentence_length + 1,
            LengthUnit::Characters | LengthUnit::Words => sentence_length,
        }
    }

    fn joined_length(&self, lengths: &[usize]) -> usize {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| self.cost(len, i > 0))
            .sum()
    }
}

/// Length of `text` in the given unit
#[inline]
pub fn measure(text: &str, unit: LengthUnit) -> usize {
    match unit {
        LengthUnit::Characters => text.chars().count(),
        LengthUnit::Words => text.split_whitespace().count(),
    }
}
