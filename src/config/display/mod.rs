#[cfg(test)]
mod tests;

use anyhow::Result;
use console::style;

use super::{BackendKind, Config};

/// Print the active configuration to stderr
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());

    for (section, entries) in config_sections(config) {
        eprintln!();
        eprintln!("{}", style(format!("{section}:")).bold().yellow());
        for (label, value) in entries {
            eprintln!("  {}: {}", label, style(value).cyan());
        }
    }

    if config.embedding.backend == BackendKind::Ollama {
        eprintln!();
        match config.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

type Section = (&'static str, Vec<(&'static str, String)>);

fn config_sections(config: &Config) -> Vec<Section> {
    let embedding = &config.embedding;
    let chunking = &config.chunking;
    let retrieval = &config.retrieval;

    let mut embedding_entries = vec![("Backend", embedding.backend.to_string())];
    if embedding.backend == BackendKind::Ollama {
        embedding_entries.extend([
            ("Host", embedding.host.clone()),
            ("Port", embedding.port.to_string()),
            ("Retry Attempts", embedding.retry_attempts.to_string()),
        ]);
    }
    embedding_entries.extend([
        ("Model", embedding.model.clone()),
        ("Dimension", embedding.embedding_dimension.to_string()),
        ("Batch Size", embedding.batch_size.to_string()),
        ("Batch Timeout", format!("{}s", embedding.timeout_seconds)),
        ("Parallelism", embedding.parallelism.to_string()),
    ]);

    vec![
        ("Embedding Settings", embedding_entries),
        (
            "Chunking Settings",
            vec![
                (
                    "Chunk Size",
                    format!("{} {}", chunking.chunk_size, chunking.unit),
                ),
                ("Overlap", format!("{} sentences", chunking.overlap)),
            ],
        ),
        (
            "Retrieval Settings",
            vec![
                ("Default Top K", retrieval.default_top_k.to_string()),
                ("Results Per Product", retrieval.k_per_product.to_string()),
                ("Filter Key", retrieval.filter_key.clone()),
                (
                    "Vector Store",
                    config.vector_store_path().display().to_string(),
                ),
            ],
        ),
    ]
}
