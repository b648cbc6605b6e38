use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{Config, show_config};
use crate::documents::{Document, DocumentSource, JsonDocumentSource};
use crate::embeddings::{ConfiguredBackend, Embedder};
use crate::index::IndexManifest;
use crate::retrieval::{
    IndexOrigin, RetrievalService, RetrievedChunk, ServiceOptions, format_comparison,
};

/// The service as assembled from configuration
pub type ConfiguredService = RetrievalService<ConfiguredBackend>;

/// Assemble a retrieval service from configuration and a document source
#[inline]
pub fn create_service(
    config: &Config,
    source: Arc<dyn DocumentSource>,
) -> Result<ConfiguredService> {
    let backend = ConfiguredBackend::from_config(&config.embedding)
        .context("Failed to create embedding backend")?;
    let embedder = Embedder::new(
        backend,
        config.embedding.batch_size as usize,
        config.embedding.embedding_dimension as usize,
    );

    Ok(RetrievalService::new(
        embedder,
        source,
        ServiceOptions::from_config(config),
    ))
}

/// Open the persisted index for read-only commands
async fn open_index(config: &Config) -> Result<ConfiguredService> {
    let service = create_service(config, Arc::new(Vec::<Document>::new()))?;

    if !IndexManifest::exists(service.store_dir()) {
        bail!(
            "No index found at {}. Run 'complaint-rag build --data <FILE>' first.",
            service.store_dir().display()
        );
    }

    service
        .open()
        .await
        .context("Failed to load index. Run 'complaint-rag build --force --data <FILE>' to rebuild it.")?;
    Ok(service)
}

async fn check_backend(service: &ConfiguredService) -> Result<()> {
    let ConfiguredBackend::Ollama(client) = service.embedder().backend() else {
        return Ok(());
    };

    let client = client.clone();
    let url = client.base_url().to_string();
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?;

    match health {
        Ok(()) => {
            info!("Ollama is healthy at {}", url);
            Ok(())
        }
        Err(e) => {
            error!("Ollama health check failed: {:#}", e);
            println!("Error: Cannot use Ollama at {}", url);
            println!("Please ensure Ollama is running and the model is pulled.");
            println!("Use 'complaint-rag config --show' to check connection settings.");
            Err(e)
        }
    }
}

/// Build the index from a JSON or JSON-lines complaint file
#[inline]
pub async fn build_index(config: &Config, data: &Path, force: bool) -> Result<()> {
    if !data.is_file() {
        bail!("Data file not found: {}", data.display());
    }

    let source = Arc::new(JsonDocumentSource::new(data));
    let service = create_service(config, source)?;
    check_backend(&service).await?;

    println!("Building index from {}", data.display());
    println!("Index directory: {}", service.store_dir().display());

    let report = {
        let build = service.initialize(force);
        tokio::pin!(build);

        tokio::select! {
            result = &mut build => result,
            _ = tokio::signal::ctrl_c() => {
                println!("\nReceived interrupt signal, cancelling build...");
                service.cancel_build();
                build.await
            }
        }
    }
    .context("Failed to build index")?;

    match report.origin {
        IndexOrigin::Loaded => {
            println!(
                "Index already exists with {} entries; use --force to rebuild.",
                report.entries
            );
        }
        IndexOrigin::Built => {
            println!(
                "Indexed {} documents into {} chunks.",
                report.documents, report.entries
            );
        }
    }

    Ok(())
}

/// Answer a question with the most similar complaint chunks
#[inline]
pub async fn query_index(
    config: &Config,
    question: &str,
    product: Option<&str>,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let service = open_index(config).await?;
    let results = service
        .query(question, product, k)
        .await
        .with_context(|| format!("Query failed: {}", question))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No relevant complaints found.");
        return Ok(());
    }

    print_results(&results, &config.retrieval.filter_key);
    Ok(())
}

/// Run the same question against several products
#[inline]
pub async fn compare_products(
    config: &Config,
    question: &str,
    products: &[String],
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    if products.len() < 2 {
        warn!("Comparison requested with {} product(s)", products.len());
    }

    let service = open_index(config).await?;
    let groups = service
        .compare(question, products, k)
        .await
        .with_context(|| format!("Comparison failed: {}", question))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&groups).context("Failed to serialize results")?
        );
    } else {
        println!("{}", format_comparison(&groups, &config.retrieval.filter_key));
    }

    Ok(())
}

/// List the products present in the index
#[inline]
pub async fn list_products(config: &Config) -> Result<()> {
    let service = open_index(config).await?;
    let products = service.products().await?;

    if products.is_empty() {
        println!(
            "No entries carry a '{}' field.",
            config.retrieval.filter_key
        );
        return Ok(());
    }

    println!("Products ({} total):", products.len());
    for product in &products {
        println!("  {}", product);
    }

    Ok(())
}

/// Describe the persisted index and whether it matches the configuration
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    let service = create_service(config, Arc::new(Vec::<Document>::new()))?;
    let store_dir = service.store_dir();

    println!("Index Status");
    println!("============");
    println!("Directory: {}", store_dir.display());

    if !IndexManifest::exists(store_dir) {
        println!("State: no index built yet");
        println!("Use 'complaint-rag build --data <FILE>' to build one.");
        return Ok(());
    }

    let manifest = match IndexManifest::read(store_dir) {
        Ok(manifest) => manifest,
        Err(e) => {
            println!("State: unreadable ({})", e);
            println!("Use 'complaint-rag build --force --data <FILE>' to rebuild it.");
            return Ok(());
        }
    };

    println!("Build ID: {}", manifest.build_id);
    println!(
        "Built: {}",
        manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Entries: {}", manifest.count);
    println!("Model: {} ({} dimensions)", manifest.model, manifest.dimension);
    println!(
        "Chunking: {} {} per chunk, {} sentence overlap",
        manifest.chunk_size, manifest.unit, manifest.overlap
    );

    let mismatches = service.expectation().mismatches(&manifest);
    if mismatches.is_empty() {
        println!("State: ready");
    } else {
        println!("State: stale, the next build will replace it");
        for mismatch in &mismatches {
            println!("  - {}", mismatch);
        }
    }

    Ok(())
}

/// Apply `KEY=VALUE` assignments and save, or write defaults if no file exists, then print
#[inline]
pub fn configure(config: &Config, show_only: bool, assignments: &[String]) -> Result<()> {
    let path = config.config_file_path();

    if show_only {
        return show_config(config);
    }

    if assignments.is_empty() {
        if !path.exists() {
            config.save()?;
            println!("Wrote default configuration to {}", path.display());
        }
        return show_config(config);
    }

    let mut updated = config.clone();
    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", assignment);
        };
        updated
            .set_value(key.trim(), value.trim())
            .with_context(|| format!("Failed to set {}", key.trim()))?;
    }

    updated.save()?;
    println!(
        "Updated {} setting(s) in {}",
        assignments.len(),
        path.display()
    );
    show_config(&updated)
}

fn print_results(results: &[RetrievedChunk], filter_key: &str) {
    for (i, result) in results.iter().enumerate() {
        let product = result
            .metadata
            .get(filter_key)
            .map_or("Unknown", String::as_str);
        let issue = result
            .metadata
            .get("issue")
            .map_or("Unknown", String::as_str);

        println!("{}. [{:.3}] {} / {}", i + 1, result.score, product, issue);
        println!("   {}", result.text);
        println!();
    }
}
