use super::*;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("should write test file");
    path
}

#[test]
fn clean_text_collapses_whitespace() {
    assert_eq!(clean_text("  too   many\n\nspaces\there "), "too many spaces here");
    assert_eq!(clean_text("   "), "");
}

#[test]
fn document_builder() {
    let doc = Document::new("fees are too high", Metadata::new())
        .with_field("product", "Credit card")
        .with_field("state", "CA");

    assert_eq!(doc.text, "fees are too high");
    assert_eq!(doc.metadata.get("product").map(String::as_str), Some("Credit card"));
    assert_eq!(doc.metadata.len(), 2);
}

#[test]
fn load_json_array() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &dir,
        "complaints.json",
        r#"[
            {"complaint_narrative": "Test complaint about  credit card fees", "product": "Credit Card", "company": "Test Bank", "state": "CA", "issue": "Fees"},
            {"complaint_narrative": "Another test complaint", "Product": "Mortgage", "company": "Test Lender", "state": "NY", "issue": "Delays", "complaint_id": 42, "tags": null}
        ]"#,
    );

    let documents = JsonDocumentSource::new(&path)
        .load_documents()
        .expect("should load documents");

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].text, "Test complaint about credit card fees");
    assert_eq!(documents[0].metadata["product"], "Credit Card");
    assert_eq!(documents[1].metadata["product"], "Mortgage");
    assert_eq!(documents[1].metadata["complaint_id"], "42");
    assert!(!documents[1].metadata.contains_key("tags"));
    assert!(!documents[0].metadata.contains_key("complaint_narrative"));
}

#[test]
fn load_jsonl_with_fallback_text_field() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &dir,
        "complaints.jsonl",
        "{\"narrative\": \"First one.\", \"product\": \"Mortgage\"}\n\n{\"narrative\": \"Second one.\", \"product\": \"Student loan\"}\n",
    );

    let documents = JsonDocumentSource::new(&path)
        .load_documents()
        .expect("should load documents");

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[1].text, "Second one.");
    assert_eq!(documents[1].metadata["product"], "Student loan");
}

#[test]
fn records_without_text_are_skipped() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &dir,
        "complaints.json",
        r#"[{"complaint_narrative": "   ", "product": "Mortgage"}, {"product": "Mortgage"}, {"complaint_narrative": "kept", "product": "Mortgage"}]"#,
    );

    let documents = JsonDocumentSource::new(&path)
        .load_documents()
        .expect("should load documents");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].text, "kept");
}

#[test]
fn custom_text_field() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(
        &dir,
        "complaints.json",
        r#"[{"body": "custom field text", "product": "Mortgage"}]"#,
    );

    let documents = JsonDocumentSource::new(&path)
        .with_text_field("body")
        .load_documents()
        .expect("should load documents");

    assert_eq!(documents[0].text, "custom field text");
}

#[test]
fn unsupported_extension() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&dir, "complaints.csv", "product,narrative\n");

    let result = JsonDocumentSource::new(&path).load_documents();
    assert!(matches!(result, Err(RetrievalError::DocumentSource(_))));
}

#[test]
fn malformed_json_is_reported() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_file(&dir, "complaints.json", "[{\"complaint_narrative\": ");

    let result = JsonDocumentSource::new(&path).load_documents();
    assert!(matches!(result, Err(RetrievalError::DocumentSource(_))));
}

#[test]
fn in_memory_source() {
    let documents = vec![Document::new("one", Metadata::new())];
    assert_eq!(documents.describe(), "1 in-memory documents");
    assert_eq!(
        documents.load_documents().expect("should load documents"),
        documents
    );
}
