// On-disk layout of a saved index:
//
//   vectors.bin    bincode, dimension plus row-major floats in slot order
//   metadata.json  chunks in slot order
//   manifest.json  build configuration and entry count, written last
//
// Saves go to a sibling staging directory that is renamed into place, so a
// directory without a manifest is never the result of a completed save.


use std::fs;
use std::path::{Path, PathBuf};

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::{Chunk, ChunkingConfig, LengthUnit};
use crate::{Result, RetrievalError};

pub const FORMAT_VERSION: u32 = 1;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Record of how a persisted index was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub unit: LengthUnit,
    pub count: usize,
}

/// Configuration a persisted index must have been built with to be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexExpectation {
    pub model: String,
    pub dimension: usize,
    pub chunking: ChunkingConfig,
}

/// Contents of a validated index directory
#[derive(Debug)]
pub struct StoredIndex {
    pub manifest: IndexManifest,
    pub vectors: Vec<f32>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Encode, Decode)]
struct VectorData {
    dimension: u64,
    data: Vec<f32>,
}

impl IndexManifest {
    /// Whether `dir` holds a manifest, i.e. a completed save
    #[inline]
    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    #[inline]
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| corrupt(dir, format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| corrupt(dir, format!("invalid {}: {}", MANIFEST_FILE, e)))
    }

    fn for_build(expectation: &IndexExpectation, count: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: expectation.model.clone(),
            dimension: expectation.dimension,
            chunk_size: expectation.chunking.chunk_size,
            overlap: expectation.chunking.overlap,
            unit: expectation.chunking.unit,
            count,
        }
    }
}

impl IndexExpectation {
    #[inline]
    pub fn new(model: impl Into<String>, dimension: usize, chunking: ChunkingConfig) -> Self {
        Self {
            model: model.into(),
            dimension,
            chunking,
        }
    }

    /// Every way `manifest` disagrees with this expectation
    #[inline]
    pub fn mismatches(&self, manifest: &IndexManifest) -> Vec<String> {
        let mut problems = Vec::new();

        if manifest.format_version != FORMAT_VERSION {
            problems.push(format!(
                "format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            ));
        }
        if manifest.model != self.model {
            problems.push(format!(
                "model '{}' (expected '{}')",
                manifest.model, self.model
            ));
        }
        if manifest.dimension != self.dimension {
            problems.push(format!(
                "dimension {} (expected {})",
                manifest.dimension, self.dimension
            ));
        }
        if manifest.chunk_size != self.chunking.chunk_size
            || manifest.overlap != self.chunking.overlap
            || manifest.unit != self.chunking.unit
        {
            problems.push(format!(
                "chunking {} {} / overlap {} (expected {} {} / overlap {})",
                manifest.chunk_size,
                manifest.unit,
                manifest.overlap,
                self.chunking.chunk_size,
                self.chunking.unit,
                self.chunking.overlap
            ));
        }

        problems
    }
}

/// Write `vectors` and `chunks` to `dir` as one unit, replacing any previous index
#[inline]
pub fn save(
    dir: &Path,
    expectation: &IndexExpectation,
    vectors: &[f32],
    chunks: &[Chunk],
) -> Result<IndexManifest> {
    if vectors.len() != chunks.len() * expectation.dimension {
        return Err(RetrievalError::LengthMismatch {
            vectors: vectors.len() / expectation.dimension.max(1),
            metadata: chunks.len(),
        });
    }

    let manifest = IndexManifest::for_build(expectation, chunks.len());
    let staging = sibling(dir, "staging", manifest.build_id);

    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir(&staging)?;

    let written = write_files(&staging, &manifest, vectors, chunks)
        .and_then(|()| swap_into_place(&staging, dir, manifest.build_id));
    if written.is_err() && staging.exists() {
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(
                "Failed to clean up staging directory {}: {}",
                staging.display(),
                e
            );
        }
    }
    written?;

    info!(
        "Saved index with {} entries ({}-d, model {}) to {}",
        manifest.count,
        manifest.dimension,
        manifest.model,
        dir.display()
    );
    Ok(manifest)
}

/// Read and validate the index in `dir`
#[inline]
pub fn load(dir: &Path, expectation: &IndexExpectation) -> Result<StoredIndex> {
    if !IndexManifest::exists(dir) {
        return Err(corrupt(dir, format!("{} is missing", MANIFEST_FILE)));
    }

    let manifest = IndexManifest::read(dir)?;
    let problems = expectation.mismatches(&manifest);
    if !problems.is_empty() {
        return Err(corrupt(
            dir,
            format!("incompatible index: {}", problems.join(", ")),
        ));
    }

    let bytes = fs::read(dir.join(VECTORS_FILE))
        .map_err(|e| corrupt(dir, format!("cannot read {}: {}", VECTORS_FILE, e)))?;
    let (vector_data, _): (VectorData, usize) = decode_from_slice(&bytes, bincode_config())
        .map_err(|e| corrupt(dir, format!("invalid {}: {}", VECTORS_FILE, e)))?;

    let content = fs::read_to_string(dir.join(METADATA_FILE))
        .map_err(|e| corrupt(dir, format!("cannot read {}: {}", METADATA_FILE, e)))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&content)
        .map_err(|e| corrupt(dir, format!("invalid {}: {}", METADATA_FILE, e)))?;

    if vector_data.dimension != manifest.dimension as u64 {
        return Err(corrupt(
            dir,
            format!(
                "stored vectors are {}-d but manifest says {}-d",
                vector_data.dimension, manifest.dimension
            ),
        ));
    }
    let expected_floats = manifest
        .count
        .checked_mul(manifest.dimension)
        .ok_or_else(|| {
            corrupt(
                dir,
                format!(
                    "manifest size {} x {} overflows",
                    manifest.count, manifest.dimension
                ),
            )
        })?;
    if vector_data.data.len() != expected_floats {
        return Err(corrupt(
            dir,
            format!(
                "{} floats stored, expected {} entries of {} dimensions",
                vector_data.data.len(),
                manifest.count,
                manifest.dimension
            ),
        ));
    }
    if chunks.len() != manifest.count {
        return Err(corrupt(
            dir,
            format!(
                "{} metadata entries stored, manifest says {}",
                chunks.len(),
                manifest.count
            ),
        ));
    }

    debug!(
        "Loaded index {} with {} entries from {}",
        manifest.build_id,
        manifest.count,
        dir.display()
    );

    Ok(StoredIndex {
        manifest,
        vectors: vector_data.data,
        chunks,
    })
}

fn write_files(
    staging: &Path,
    manifest: &IndexManifest,
    vectors: &[f32],
    chunks: &[Chunk],
) -> Result<()> {
    let vector_data = VectorData {
        dimension: manifest.dimension as u64,
        data: vectors.to_vec(),
    };
    let bytes = encode_to_vec(&vector_data, bincode_config())
        .map_err(|e| anyhow::anyhow!("Failed to encode vectors: {}", e))?;
    fs::write(staging.join(VECTORS_FILE), bytes)?;

    let metadata = serde_json::to_vec(chunks)
        .map_err(|e| anyhow::anyhow!("Failed to serialize metadata: {}", e))?;
    fs::write(staging.join(METADATA_FILE), metadata)?;

    let manifest_json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| anyhow::anyhow!("Failed to serialize manifest: {}", e))?;
    fs::write(staging.join(MANIFEST_FILE), manifest_json)?;

    Ok(())
}

fn swap_into_place(staging: &Path, dir: &Path, build_id: Uuid) -> Result<()> {
    if !dir.exists() {
        fs::rename(staging, dir)?;
        return Ok(());
    }

    let retired = sibling(dir, "old", build_id);
    fs::rename(dir, &retired)?;
    if let Err(e) = fs::rename(staging, dir) {
        // Put the previous index back before reporting
        if let Err(restore) = fs::rename(&retired, dir) {
            warn!(
                "Failed to restore previous index from {}: {}",
                retired.display(),
                restore
            );
        }
        return Err(e.into());
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(
            "Failed to remove previous index at {}: {}",
            retired.display(),
            e
        );
    }
    Ok(())
}

/// Hidden directory next to `dir`, e.g. `.vector_store.staging-<id>`
fn sibling(dir: &Path, label: &str, build_id: Uuid) -> PathBuf {
    let name = dir
        .file_name()
        .map_or_else(|| "index".into(), |n| n.to_string_lossy());
    dir.with_file_name(format!(".{}.{}-{}", name, label, build_id.simple()))
}

fn corrupt(dir: &Path, reason: String) -> RetrievalError {
    RetrievalError::CorruptPersistedState {
        path: dir.to_path_buf(),
        reason,
    }
}
