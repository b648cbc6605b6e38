use super::*;

fn labels(section: &Section) -> Vec<&'static str> {
    section.1.iter().map(|(label, _)| *label).collect()
}

#[test]
fn ollama_sections_include_server() {
    let config = Config::with_base_dir("/tmp/complaint-rag");
    let sections = config_sections(&config);

    assert_eq!(sections.len(), 3);
    assert!(labels(&sections[0]).contains(&"Host"));
    assert!(
        sections[2]
            .1
            .contains(&("Vector Store", "/tmp/complaint-rag/vector_store".to_string()))
    );
}

#[test]
fn hashing_sections_omit_server() {
    let mut config = Config::default();
    config.embedding.backend = BackendKind::Hashing;
    let sections = config_sections(&config);

    assert!(!labels(&sections[0]).contains(&"Host"));
    assert_eq!(sections[0].1[0], ("Backend", "hashing".to_string()));
    assert!(
        sections[1]
            .1
            .contains(&("Chunk Size", "500 characters".to_string()))
    );
}

#[test]
fn show_config_succeeds() {
    assert!(show_config(&Config::default()).is_ok());
}
