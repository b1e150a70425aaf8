use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use quarry::config::QuarryConfig;
use quarry::document::Document;
use quarry::policy::{IndexField, IndexPolicy, QueryField, QueryPolicy};
use quarry::repository::{
    ConfigurationRepository, FileConfigurationRepository, InMemoryDocumentRepository,
};
use quarry::service::{IndexStorage, SearchService};

fn config(root: &TempDir) -> QuarryConfig {
    QuarryConfig {
        index_root: root.path().join("index"),
        config_root: root.path().join("config"),
        writer_threads: 1,
        ..QuarryConfig::default()
    }
}

fn disk_service(root: &TempDir) -> SearchService {
    let config = config(root);
    let configuration = Arc::new(FileConfigurationRepository::new(&config.config_root));
    SearchService::new(
        config,
        IndexStorage::Disk,
        Arc::new(InMemoryDocumentRepository::new()),
        configuration,
    )
    .unwrap()
}

#[test]
fn test_index_and_policies_survive_restart() {
    let root = TempDir::new().unwrap();
    {
        let service = disk_service(&root);
        service
            .configuration()
            .save_index_policy("notes", &IndexPolicy::new().with_field(IndexField::new("text").tokenized()))
            .unwrap();
        service
            .configuration()
            .save_query_policy("notes", &QueryPolicy::new().with_field(QueryField::new("text")))
            .unwrap();

        let note = Document::builder("journal")
            .id("n1")
            .attribute("text", "persisted across restarts")
            .build()
            .unwrap();
        service.save_and_index("notes", "notes", note, false).unwrap();
    }

    assert!(root.path().join("index").join("notes").is_dir());
    assert!(root.path().join("config/query/notes.json").is_file());

    let reopened = disk_service(&root);
    let options = HashMap::from([("keywords".to_string(), "restarts".to_string())]);
    let results = reopened.search("notes", "notes", &options, false, 1, 10).unwrap();
    assert_eq!(results.total_hits, 1);
    assert_eq!(results.hits[0].id(), Some("n1"));

    let stats = reopened.cache_stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_unopened_index_is_empty() {
    let root = TempDir::new().unwrap();
    let service = disk_service(&root);
    assert_eq!(service.reader("fresh").unwrap().num_docs(), 0);
    assert!(service.invalidate("fresh").unwrap());
}
