#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests over a complaint file using the offline hashing backend

use std::fs;
use std::sync::Arc;

use complaint_rag::commands::{
    configure, create_service, list_products, query_index, show_status,
};
use complaint_rag::config::{BackendKind, Config};
use complaint_rag::documents::{Document, JsonDocumentSource};
use complaint_rag::index::IndexManifest;
use complaint_rag::retrieval::{IndexOrigin, format_context};
use tempfile::TempDir;

const COMPLAINTS: &str = r#"{"complaint_narrative": "fees are too high", "Product": "Credit card", "issue": "Fees or interest", "state": "CA"}
{"complaint_narrative": "fraud charge not removed", "Product": "Credit card", "issue": "Problem with a purchase", "state": "TX"}
{"complaint_narrative": "mortgage rate increased unfairly", "Product": "Mortgage", "issue": "Trouble during payment process", "state": null}
{"complaint_narrative": "   ", "Product": "Mortgage", "issue": "Empty narrative"}
"#;

fn test_setup() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.embedding.backend = BackendKind::Hashing;
    config.embedding.embedding_dimension = 384;
    config.embedding.batch_size = 2;

    fs::write(temp_dir.path().join("complaints.jsonl"), COMPLAINTS)
        .expect("should write complaints");
    (config, temp_dir)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
async fn build_and_query_from_complaint_file() {
    init_test_tracing();
    let (config, temp_dir) = test_setup();

    let source = Arc::new(JsonDocumentSource::new(
        temp_dir.path().join("complaints.jsonl"),
    ));
    let service = create_service(&config, source).expect("should create service");

    let report = service.initialize(false).await.expect("should build");
    assert_eq!(report.origin, IndexOrigin::Built);
    assert_eq!(report.documents, 3);
    assert_eq!(report.entries, 3);
    assert!(IndexManifest::exists(&config.vector_store_path()));

    let results = service
        .query("unauthorized charge", None, Some(2))
        .await
        .expect("should query");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "fraud charge not removed");
    assert_eq!(results[0].metadata["product"], "Credit card");
    assert_eq!(results[0].metadata["state"], "TX");

    let mortgage = service
        .query("unauthorized charge", Some("Mortgage"), Some(2))
        .await
        .expect("should query");
    assert_eq!(mortgage.len(), 1);
    assert_eq!(mortgage[0].text, "mortgage rate increased unfairly");
    assert!(!mortgage[0].metadata.contains_key("state"));

    let context = format_context(&mortgage, &config.retrieval.filter_key);
    assert!(context.starts_with(
        "Complaint 1 (Product: Mortgage, Issue: Trouble during payment process):"
    ));

    assert_eq!(
        service.products().await.expect("should list products"),
        ["Credit card", "Mortgage"]
    );
}

#[tokio::test]
async fn read_commands_use_persisted_index() {
    init_test_tracing();
    let (config, temp_dir) = test_setup();

    // Nothing built yet
    assert!(query_index(&config, "late fees", None, None, false).await.is_err());
    assert!(list_products(&config).await.is_err());
    show_status(&config).expect("status works without an index");

    let source = Arc::new(JsonDocumentSource::new(
        temp_dir.path().join("complaints.jsonl"),
    ));
    create_service(&config, source)
        .expect("should create service")
        .initialize(false)
        .await
        .expect("should build");

    query_index(&config, "late fees", Some("Credit card"), Some(1), true)
        .await
        .expect("should query persisted index");
    list_products(&config).await.expect("should list products");
    show_status(&config).expect("should show status");
}

#[tokio::test]
async fn config_change_makes_index_stale() {
    let (mut config, temp_dir) = test_setup();

    let source = Arc::new(JsonDocumentSource::new(
        temp_dir.path().join("complaints.jsonl"),
    ));
    create_service(&config, source)
        .expect("should create service")
        .initialize(false)
        .await
        .expect("should build");

    config.embedding.embedding_dimension = 256;
    let manifest = IndexManifest::read(&config.vector_store_path()).expect("should read");
    let service = create_service(&config, Arc::new(Vec::<Document>::new())).expect("should create service");
    assert_eq!(service.expectation().mismatches(&manifest).len(), 2);

    // Read-only commands refuse to serve an incompatible index
    assert!(query_index(&config, "late fees", None, None, false).await.is_err());
}

#[test]
fn config_assignments_are_saved() {
    let (config, temp_dir) = test_setup();

    configure(
        &config,
        false,
        &[
            "retrieval.default_top_k = 8".to_string(),
            "embedding.retry_attempts=4".to_string(),
        ],
    )
    .expect("should apply settings");

    let reloaded = Config::load(temp_dir.path()).expect("should reload");
    assert_eq!(reloaded.retrieval.default_top_k, 8);
    assert_eq!(reloaded.embedding.retry_attempts, 4);
    assert_eq!(reloaded.embedding.backend, BackendKind::Hashing);

    // A bad assignment leaves the saved file alone
    assert!(configure(&reloaded, false, &["retrieval.default_top_k".to_string()]).is_err());
    assert!(configure(&reloaded, false, &["embedding.retry_attempts=50".to_string()]).is_err());
    let unchanged = Config::load(temp_dir.path()).expect("should reload");
    assert_eq!(unchanged, reloaded);
}
