// Retrieval service: builds or loads the index and answers similarity queries

mod pipeline;


use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::documents::{DocumentSource, Metadata};
use crate::embeddings::{Chunker, ChunkingConfig, Embedder, EmbeddingBackend};
use crate::index::{FlatIndex, IndexExpectation, IndexManifest, MetadataFilter, VectorIndex};
use crate::{Result, RetrievalError};

use pipeline::{BuildPipeline, BuiltIndex, embed_with_timeout};

/// Lifecycle of the service; queries are only answered when `Ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Uninitialized,
    Building,
    Loading,
    Ready,
}

impl std::fmt::Display for ServiceStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Building => write!(f, "building"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

enum ServiceState<I> {
    Uninitialized,
    Building,
    Loading,
    Ready(Arc<I>),
}

impl<I> ServiceState<I> {
    fn status(&self) -> ServiceStatus {
        match self {
            Self::Uninitialized => ServiceStatus::Uninitialized,
            Self::Building => ServiceStatus::Building,
            Self::Loading => ServiceStatus::Loading,
            Self::Ready(_) => ServiceStatus::Ready,
        }
    }
}

/// A ranked chunk handed to answer generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Results for one product of a comparison query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductGroup {
    pub product: String,
    pub results: Vec<RetrievedChunk>,
}

/// How `initialize` obtained its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub origin: IndexOrigin,
    pub entries: usize,
    /// Source documents processed; zero when the index was loaded
    pub documents: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: usize,
    pub model: String,
    /// Distinct source documents with at least one chunk indexed
    pub documents: usize,
}

/// Service settings, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub chunking: ChunkingConfig,
    pub store_dir: PathBuf,
    pub default_top_k: usize,
    pub k_per_product: usize,
    pub filter_key: String,
    pub batch_timeout: Duration,
    pub parallelism: usize,
}

impl ServiceOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking.clone(),
            store_dir: config.vector_store_path(),
            default_top_k: config.retrieval.default_top_k,
            k_per_product: config.retrieval.k_per_product,
            filter_key: config.retrieval.filter_key.clone(),
            batch_timeout: Duration::from_secs(config.embedding.timeout_seconds),
            parallelism: config.embedding.parallelism,
        }
    }

    /// Defaults for an index stored in `store_dir`
    #[inline]
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&Config::default()).with_store_dir(store_dir)
    }

    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.store_dir = store_dir.into();
        self
    }
}

/// Orchestrates chunking, embedding, indexing, and persistence.
///
/// Builds run on a private index that only becomes visible once it is
/// complete and saved. While a build or load is in progress the service
/// reports `Building`/`Loading` and rejects queries.
pub struct RetrievalService<B, I = FlatIndex> {
    embedder: Arc<Embedder<B>>,
    source: Arc<dyn DocumentSource>,
    options: ServiceOptions,
    state: RwLock<ServiceState<I>>,
    build_lock: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl<B, I> RetrievalService<B, I>
where
    B: EmbeddingBackend + 'static,
    I: VectorIndex + 'static,
{
    #[inline]
    pub fn new(
        embedder: Embedder<B>,
        source: Arc<dyn DocumentSource>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            embedder: Arc::new(embedder),
            source,
            options,
            state: RwLock::new(ServiceState::Uninitialized),
            build_lock: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub async fn status(&self) -> ServiceStatus {
        self.state.read().await.status()
    }

    #[inline]
    pub fn embedder(&self) -> &Embedder<B> {
        &self.embedder
    }

    #[inline]
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    #[inline]
    pub fn store_dir(&self) -> &Path {
        &self.options.store_dir
    }

    /// Configuration a persisted index has to match
    #[inline]
    pub fn expectation(&self) -> IndexExpectation {
        IndexExpectation::new(
            self.embedder.model_id(),
            self.embedder.dimension(),
            self.options.chunking.clone(),
        )
    }

    /// Load the persisted index, or build one from the document source.
    ///
    /// A persisted index that is corrupt or was built with a different
    /// configuration is rebuilt. With `force_rebuild` the persisted index is
    /// ignored and replaced.
    #[inline]
    pub async fn initialize(&self, force_rebuild: bool) -> Result<InitReport> {
        let _build = self.build_lock.lock().await;
        self.cancel.store(false, Ordering::SeqCst);

        let store_dir = self.options.store_dir.clone();

        if !force_rebuild && IndexManifest::exists(&store_dir) {
            match self.load_into_state().await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_corrupt_index() => {
                    warn!("Persisted index is unusable, rebuilding: {}", e);
                }
                Err(e) => return Err(e),
            }
        } else if force_rebuild {
            info!("Forced rebuild requested");
        } else {
            info!("No persisted index at {}, building", store_dir.display());
        }

        // Dropping the previous index here keeps stale results from being served
        self.set_state(ServiceState::Building).await;

        match self.build_and_save().await {
            Ok((index, documents)) => {
                let entries = index.len();
                self.set_state(ServiceState::Ready(Arc::new(index))).await;
                Ok(InitReport {
                    origin: IndexOrigin::Built,
                    entries,
                    documents,
                })
            }
            Err(e) => {
                self.set_state(ServiceState::Uninitialized).await;
                Err(e)
            }
        }
    }

    /// Load the persisted index without falling back to a build
    #[inline]
    pub async fn open(&self) -> Result<InitReport> {
        let _build = self.build_lock.lock().await;
        self.load_into_state().await
    }

    /// Discard the current index and build a new one
    #[inline]
    pub async fn rebuild(&self) -> Result<InitReport> {
        self.initialize(true).await
    }

    /// Stop the build in progress at its next batch boundary
    #[inline]
    pub fn cancel_build(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Rank chunks by similarity to `question`, optionally within one product
    #[inline]
    pub async fn query(
        &self,
        question: &str,
        product: Option<&str>,
        k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>> {
        let index = self.ready_index().await?;
        let k = k.unwrap_or(self.options.default_top_k);
        let vector = self.embed_query(question).await?;

        let hits = match product {
            Some(product) => {
                let filter = MetadataFilter::new(&self.options.filter_key, product);
                index.search_filtered(&vector, k, &filter)?
            }
            None => index.search(&vector, k)?,
        };

        debug!(
            "Query returned {} results (product filter: {:?}, k={})",
            hits.len(),
            product,
            k
        );

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.chunk.text,
                metadata: hit.chunk.metadata,
                score: hit.score,
            })
            .collect())
    }

    /// Query once per product, keeping each product's results separate.
    ///
    /// Groups follow the order of `products`; repeated products get their own group.
    #[inline]
    pub async fn compare(
        &self,
        question: &str,
        products: &[String],
        k_per_product: Option<usize>,
    ) -> Result<Vec<ProductGroup>> {
        let k = k_per_product.unwrap_or(self.options.k_per_product);
        let mut groups = Vec::with_capacity(products.len());

        for product in products {
            let results = self.query(question, Some(product.as_str()), Some(k)).await?;
            groups.push(ProductGroup {
                product: product.clone(),
                results,
            });
        }

        Ok(groups)
    }

    /// Distinct values of the filter key, sorted
    #[inline]
    pub async fn products(&self) -> Result<Vec<String>> {
        let index = self.ready_index().await?;
        let products: BTreeSet<&str> = index
            .chunks()
            .iter()
            .filter_map(|chunk| chunk.metadata.get(&self.options.filter_key))
            .map(String::as_str)
            .collect();

        Ok(products.into_iter().map(str::to_string).collect())
    }

    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        let index = self.ready_index().await?;
        Ok(IndexStats {
            entries: index.len(),
            dimension: index.dimension().unwrap_or(self.embedder.dimension()),
            model: self.embedder.model_id().to_string(),
            documents: index
                .chunks()
                .iter()
                .filter(|chunk| chunk.chunk_index == 0)
                .count(),
        })
    }

    async fn ready_index(&self) -> Result<Arc<I>> {
        let state = self.state.read().await;
        match &*state {
            ServiceState::Ready(index) => Ok(Arc::clone(index)),
            other => Err(RetrievalError::NotInitialized {
                state: other.status(),
            }),
        }
    }

    async fn set_state(&self, state: ServiceState<I>) {
        let mut guard = self.state.write().await;
        debug!("Service state {} -> {}", guard.status(), state.status());
        *guard = state;
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        let mut vectors = embed_with_timeout(
            &self.embedder,
            vec![question.to_string()],
            self.options.batch_timeout,
        )
        .await?;

        vectors.pop().ok_or_else(|| {
            RetrievalError::EmbeddingBackend("Backend returned no vector for query".to_string())
        })
    }

    async fn load_into_state(&self) -> Result<InitReport> {
        self.set_state(ServiceState::Loading).await;
        match self.load_persisted().await {
            Ok(index) => {
                let entries = index.len();
                self.set_state(ServiceState::Ready(Arc::new(index))).await;
                info!(
                    "Loaded index with {} entries from {}",
                    entries,
                    self.options.store_dir.display()
                );
                Ok(InitReport {
                    origin: IndexOrigin::Loaded,
                    entries,
                    documents: 0,
                })
            }
            Err(e) => {
                self.set_state(ServiceState::Uninitialized).await;
                Err(e)
            }
        }
    }

    async fn load_persisted(&self) -> Result<I> {
        let dir = self.options.store_dir.clone();
        let expectation = self.expectation();
        tokio::task::spawn_blocking(move || I::load(&dir, &expectation))
            .await
            .map_err(|e| anyhow::anyhow!("Index loading task failed: {}", e))?
    }

    async fn build_and_save(&self) -> Result<(I, usize)> {
        let pipeline = BuildPipeline {
            source: Arc::clone(&self.source),
            chunker: Chunker::new(self.options.chunking.clone()),
            embedder: Arc::clone(&self.embedder),
            timeout: self.options.batch_timeout,
            parallelism: self.options.parallelism,
            cancel: Arc::clone(&self.cancel),
        };

        let BuiltIndex { index, documents } = pipeline.run::<I>().await?;

        // Last chance to cancel before the persisted index is replaced
        if self.cancel.load(Ordering::SeqCst) {
            warn!("Index build cancelled before saving");
            return Err(RetrievalError::Cancelled);
        }

        let dir = self.options.store_dir.clone();
        let expectation = self.expectation();
        let index = tokio::task::spawn_blocking(move || {
            index.save(&dir, &expectation).map(|_| index)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Index saving task failed: {}", e))??;

        info!(
            "Built index with {} entries from {} documents",
            index.len(),
            documents
        );
        Ok((index, documents))
    }
}

/// Render results as numbered context blocks for answer generation.
///
/// The product shown in each header is read from `filter_key`.
#[inline]
pub fn format_context(results: &[RetrievedChunk], filter_key: &str) -> String {
    if results.is_empty() {
        return "No relevant complaints found.".to_string();
    }

    let mut context = String::new();
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            context.push('\n');
        }
        let field = |key: &str| {
            result
                .metadata
                .get(key)
                .map_or("Unknown", String::as_str)
        };
        let _ = write!(
            context,
            "Complaint {} (Product: {}, Issue: {}):\n{}\n",
            i + 1,
            field(filter_key),
            field("issue"),
            result.text
        );
    }
    context
}

/// Render comparison groups, one headed section per product
#[inline]
pub fn format_comparison(groups: &[ProductGroup], filter_key: &str) -> String {
    groups
        .iter()
        .map(|group| {
            format!(
                "=== {} Complaints ===\n{}",
                group.product,
                format_context(&group.results, filter_key)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
