// Source documents handed to the retrieval core.
// Loading is kept deliberately thin: the core only needs cleaned text plus metadata.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{Result, RetrievalError};

/// Ordered string-keyed metadata attached to documents and chunks
pub type Metadata = BTreeMap<String, String>;

const DEFAULT_TEXT_FIELD: &str = "complaint_narrative";
const FALLBACK_TEXT_FIELD: &str = "narrative";

/// A raw input record: narrative text plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Supplies the documents an index is built from
pub trait DocumentSource: Send + Sync {
    fn load_documents(&self) -> Result<Vec<Document>>;

    /// Human readable description used in logs
    fn describe(&self) -> String;
}

impl DocumentSource for Vec<Document> {
    #[inline]
    fn load_documents(&self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }

    #[inline]
    fn describe(&self) -> String {
        format!("{} in-memory documents", self.len())
    }
}

/// Loads complaint records from a JSON array or JSON-lines file
#[derive(Debug, Clone)]
pub struct JsonDocumentSource {
    path: PathBuf,
    text_field: String,
}

impl JsonDocumentSource {
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            text_field: DEFAULT_TEXT_FIELD.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<serde_json::Map<String, Value>>> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let content = fs::read_to_string(&self.path)?;

        match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                RetrievalError::DocumentSource(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Some("jsonl" | "ndjson") => content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(line_no, line)| {
                    serde_json::from_str(line).map_err(|e| {
                        RetrievalError::DocumentSource(format!(
                            "Failed to parse {} line {}: {}",
                            self.path.display(),
                            line_no + 1,
                            e
                        ))
                    })
                })
                .collect(),
            _ => Err(RetrievalError::DocumentSource(format!(
                "Unsupported file format for {}. Use .json or .jsonl",
                self.path.display()
            ))),
        }
    }

    fn record_to_document(&self, record: serde_json::Map<String, Value>) -> Option<Document> {
        let text_key = if record.contains_key(&self.text_field) {
            self.text_field.as_str()
        } else {
            FALLBACK_TEXT_FIELD
        };

        let text = record
            .get(text_key)
            .and_then(scalar_to_string)
            .map(|raw| clean_text(&raw))
            .filter(|text| !text.is_empty())?;

        let metadata = record
            .iter()
            .filter(|(key, _)| key.as_str() != text_key)
            .filter_map(|(key, value)| {
                scalar_to_string(value).map(|value| (normalize_key(key), value))
            })
            .collect();

        Some(Document { text, metadata })
    }
}

impl DocumentSource for JsonDocumentSource {
    #[inline]
    fn load_documents(&self) -> Result<Vec<Document>> {
        debug!("Loading documents from {}", self.path.display());

        let records = self.read_records()?;
        let total = records.len();
        let documents: Vec<Document> = records
            .into_iter()
            .filter_map(|record| self.record_to_document(record))
            .collect();

        if documents.len() < total {
            warn!(
                "Skipped {} records without usable '{}' text",
                total - documents.len(),
                self.text_field
            );
        }

        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.path.display()
        );
        Ok(documents)
    }

    #[inline]
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Collapse runs of whitespace and trim the ends
#[inline]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// CFPB exports use title-cased column names
fn normalize_key(key: &str) -> String {
    match key {
        "Product" => "product".to_string(),
        "Company" => "company".to_string(),
        "State" => "state".to_string(),
        "Issue" => "issue".to_string(),
        other => other.to_string(),
    }
}
