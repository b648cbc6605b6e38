// Build pipeline: documents -> chunks -> embedded batches -> index.
//
// Batches are embedded concurrently on the blocking pool but handed to the
// index one at a time in their original order, so slots follow document order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::documents::DocumentSource;
use crate::embeddings::{Chunk, Chunker, Embedder, EmbeddingBackend};
use crate::index::VectorIndex;
use crate::{Result, RetrievalError};

/// Everything a build needs, detached from the service so it can run without holding its locks
pub(crate) struct BuildPipeline<B> {
    pub source: Arc<dyn DocumentSource>,
    pub chunker: Chunker,
    pub embedder: Arc<Embedder<B>>,
    pub timeout: Duration,
    pub parallelism: usize,
    pub cancel: Arc<AtomicBool>,
}

/// Outcome of a completed build
#[derive(Debug)]
pub(crate) struct BuiltIndex<I> {
    pub index: I,
    pub documents: usize,
}

impl<B: EmbeddingBackend + 'static> BuildPipeline<B> {
    pub async fn run<I: VectorIndex>(&self) -> Result<BuiltIndex<I>> {
        let source = Arc::clone(&self.source);
        info!("Loading documents from {}", source.describe());
        let documents = tokio::task::spawn_blocking(move || source.load_documents())
            .await
            .map_err(|e| anyhow::anyhow!("Document loading task failed: {}", e))??;

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|document| self.chunker.chunk_document(document))
            .collect();

        info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );
        if chunks.is_empty() {
            warn!("No chunks to index; the index will be empty");
        }

        let mut index = I::with_dimension(self.embedder.dimension());
        let batch_size = self.embedder.batch_size();
        let batch_count = chunks.len().div_ceil(batch_size);

        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(batch_size)
            .map(<[Chunk]>::to_vec)
            .collect();

        let mut embedded = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_no, batch)| self.embed_batch(batch_no, batch))
            .buffered(self.parallelism.max(1));

        while let Some(result) = embedded.next().await {
            let (batch_no, vectors, batch) = result?;
            self.check_cancelled()?;

            index.add(vectors, batch)?;
            debug!(
                "Indexed batch {}/{} ({} entries total)",
                batch_no + 1,
                batch_count,
                index.len()
            );
        }

        Ok(BuiltIndex {
            index,
            documents: documents.len(),
        })
    }

    async fn embed_batch(
        &self,
        batch_no: usize,
        batch: Vec<Chunk>,
    ) -> Result<(usize, Vec<Vec<f32>>, Vec<Chunk>)> {
        self.check_cancelled()?;

        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_with_timeout(&self.embedder, texts, self.timeout).await?;

        Ok((batch_no, vectors, batch))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            warn!("Index build cancelled");
            return Err(RetrievalError::Cancelled);
        }
        Ok(())
    }
}

/// Run one embedding batch on the blocking pool, bounded by `timeout`
pub(crate) async fn embed_with_timeout<B: EmbeddingBackend + 'static>(
    embedder: &Arc<Embedder<B>>,
    texts: Vec<String>,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    let count = texts.len();
    let task = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts));

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.map_err(|e| anyhow::anyhow!("Embedding task failed: {}", e))?,
        Err(_) => Err(RetrievalError::EmbeddingBackend(format!(
            "Embedding batch of {} texts timed out after {:?}",
            count, timeout
        ))),
    }
}
