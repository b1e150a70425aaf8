use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use quarry::config::QuarryConfig;
use quarry::document::Document;
use quarry::error::QuarryError;
use quarry::policy::{FieldType, IndexField, IndexPolicy, LookupPolicy, QueryField, QueryPolicy};
use quarry::repository::{
    ConfigurationRepository, DocumentRepository, InMemoryConfigurationRepository,
    InMemoryDocumentRepository,
};
use quarry::search::{SearchResults, SimilarTo};
use quarry::service::{IndexStorage, SearchService};

const INDEX: &str = "catalog";
const POLICY: &str = "products";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn service_with(index_policy: IndexPolicy) -> SearchService {
    let configuration = Arc::new(InMemoryConfigurationRepository::new());
    configuration.save_index_policy(POLICY, &index_policy).unwrap();
    configuration
        .save_query_policy(
            POLICY,
            &QueryPolicy::new()
                .with_field(QueryField::new("title").with_boost(2.0))
                .with_field(QueryField::new("body"))
                .with_field(QueryField::new("price").sorted(1, true, FieldType::Integer)),
        )
        .unwrap();
    configuration
        .save_lookup_policy(
            POLICY,
            &LookupPolicy::new(QueryPolicy::new().with_field(QueryField::new("title")), "title"),
        )
        .unwrap();

    let config = QuarryConfig {
        writer_threads: 1,
        ..QuarryConfig::default()
    };
    SearchService::new(
        config,
        IndexStorage::Memory,
        Arc::new(InMemoryDocumentRepository::new()),
        configuration,
    )
    .unwrap()
    .with_today(today())
}

fn service() -> SearchService {
    service_with(
        IndexPolicy::new()
            .with_field(IndexField::new("title").tokenized())
            .with_field(IndexField::new("body").analyzed())
            .with_field(IndexField::new("price")),
    )
}

fn product(id: &str, title: &str, body: &str, price: i64) -> Document {
    Document::builder("shop")
        .id(id)
        .attribute("title", title)
        .attribute("body", body)
        .attribute("price", price)
        .build()
        .unwrap()
}

fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn ids(results: &SearchResults) -> Vec<String> {
    results
        .hits
        .iter()
        .filter_map(|h| h.id().map(str::to_string))
        .collect()
}

#[test]
fn test_pagination_covers_every_hit_once() {
    let service = service();
    for i in 0..25 {
        let doc = product(&format!("p{i:02}"), "garden widget", "a widget", i);
        service.documents().save_document(doc, false).unwrap();
    }
    let outcome = service.reindex_database(INDEX, POLICY, "shop", true).unwrap();
    assert_eq!(outcome.succeeded, 25);

    let keywords = options(&[("keywords", "widget")]);
    let page = service.search(INDEX, POLICY, &keywords, false, 11, 5).unwrap();
    assert_eq!(page.total_hits, 25);
    assert_eq!(page.hits.len(), 5);

    let mut seen = Vec::new();
    for start in (1..=25).step_by(5) {
        seen.extend(ids(&service.search(INDEX, POLICY, &keywords, false, start, 5).unwrap()));
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 25);

    let past_end = service.search(INDEX, POLICY, &keywords, false, 26, 5).unwrap();
    assert!(past_end.hits.is_empty());
    assert_eq!(past_end.total_hits, 25);
}

#[test]
fn test_reindex_is_idempotent() {
    let service = service();
    for (id, title) in [("1", "oak table"), ("2", "oak chair"), ("3", "pine shelf")] {
        service
            .documents()
            .save_document(product(id, title, "", 10), false)
            .unwrap();
    }
    service.reindex_database(INDEX, POLICY, "shop", true).unwrap();
    service.reindex_database(INDEX, POLICY, "shop", false).unwrap();

    let results = service
        .search(INDEX, POLICY, &options(&[("keywords", "oak")]), false, 1, 10)
        .unwrap();
    assert_eq!(results.total_hits, 2);
    assert_eq!(service.reader(INDEX).unwrap().num_docs(), 3);
}

#[test]
fn test_requested_sort_before_relevance() {
    let service = service();
    for (id, price) in [("cheap", 5), ("mid", 50), ("dear", 500)] {
        service
            .save_and_index(INDEX, POLICY, product(id, "lamp", "desk lamp", price), false)
            .unwrap();
    }
    let descending = options(&[
        ("keywords", "lamp"),
        ("sortField", "price"),
        ("sortAscending", "false"),
    ]);
    let results = service.search(INDEX, POLICY, &descending, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["dear", "mid", "cheap"]);

    // the policy sorts ascending by price on its own
    let results = service
        .search(INDEX, POLICY, &options(&[("keywords", "lamp")]), false, 1, 10)
        .unwrap();
    assert_eq!(ids(&results), vec!["cheap", "mid", "dear"]);
}

#[test]
fn test_owner_restricts_hits() {
    let mut policy = IndexPolicy::new().with_field(IndexField::new("title").tokenized());
    policy.owner = Some("acme".to_string());
    let owned = service_with(policy);
    owned
        .save_and_index(INDEX, POLICY, product("1", "anvil", "", 1), false)
        .unwrap();

    let for_acme = options(&[("keywords", "anvil"), ("owner", "acme")]);
    let for_other = options(&[("keywords", "anvil"), ("owner", "globex")]);
    let for_all = options(&[("keywords", "anvil")]);
    assert_eq!(owned.search(INDEX, POLICY, &for_acme, false, 1, 10).unwrap().total_hits, 1);
    assert_eq!(owned.search(INDEX, POLICY, &for_other, false, 1, 10).unwrap().total_hits, 0);
    assert_eq!(owned.search(INDEX, POLICY, &for_all, false, 1, 10).unwrap().total_hits, 1);
}

#[test]
fn test_lookup_more_like_this_and_explain() {
    let service = service();
    let docs = [
        ("1", "rust borrow checker", "ownership and borrowing rules"),
        ("2", "rust lifetimes", "borrowing across function boundaries"),
        ("3", "python decorators", "wrapping functions"),
    ];
    for (id, title, body) in docs {
        service.save_and_index(INDEX, POLICY, product(id, title, body, 1), false).unwrap();
    }

    let values = service
        .partial_lookup(INDEX, POLICY, &options(&[("keywords", "rust l")]), 10)
        .unwrap();
    assert_eq!(values, vec!["rust lifetimes"]);

    let similar = service
        .more_like_this(INDEX, POLICY, &SimilarTo::key("shop", "1"), 1, 10)
        .unwrap();
    assert_eq!(ids(&similar).first().map(String::as_str), Some("2"));
    assert!(!ids(&similar).contains(&"1".to_string()));

    let explained = service
        .explain_search(INDEX, POLICY, &options(&[("keywords", "rust")]), 1, 10)
        .unwrap();
    assert_eq!(explained.len(), 2);
    assert!(explained.iter().all(|e| e.explanation.value > 0.0));

    let terms = service
        .top_ranking_terms(INDEX, POLICY, &["title".to_string()], 1)
        .unwrap();
    assert_eq!(terms[0].value, "rust");
    assert_eq!(terms[0].frequency, 2);
}

#[test]
fn test_stale_revision_is_rejected() {
    let service = service();
    let saved = service
        .save_and_index(INDEX, POLICY, product("1", "kettle", "", 20), false)
        .unwrap();
    let first_revision = saved.revision().unwrap().to_string();

    let updated = saved.clone().with_revision(first_revision.clone());
    service.save_and_index(INDEX, POLICY, updated, false).unwrap();

    let stale = saved.with_revision(first_revision);
    let err = service.save_and_index(INDEX, POLICY, stale, false).unwrap_err();
    assert_eq!(err.status_code(), 409);

    let results = service
        .search(INDEX, POLICY, &options(&[("keywords", "kettle")]), false, 1, 10)
        .unwrap();
    assert_eq!(results.total_hits, 1);
}

#[test]
fn test_missing_keywords_is_rejected() {
    let service = service();
    service
        .save_and_index(INDEX, POLICY, product("1", "kettle", "", 20), false)
        .unwrap();
    let err = service
        .partial_lookup(INDEX, POLICY, &options(&[]), 10)
        .unwrap_err();
    assert!(matches!(err, QuarryError::Search(_)));
}

#[test]
fn test_open_ended_index_date_range() {
    let service = service();
    service
        .save_and_index(INDEX, POLICY, product("1", "teapot", "", 30), false)
        .unwrap();

    let since = options(&[("keywords", "teapot"), ("indexDateFrom", "20240101")]);
    let until = options(&[("keywords", "teapot"), ("indexDateTo", "20241231")]);
    let later = options(&[("keywords", "teapot"), ("indexDateFrom", "20240602")]);
    assert_eq!(service.search(INDEX, POLICY, &since, false, 1, 10).unwrap().total_hits, 1);
    assert_eq!(service.search(INDEX, POLICY, &until, false, 1, 10).unwrap().total_hits, 1);
    assert_eq!(service.search(INDEX, POLICY, &later, false, 1, 10).unwrap().total_hits, 0);
}

#[test]
fn test_delete_document_with_custom_id() {
    let mut policy = IndexPolicy::new().with_field(IndexField::new("title").tokenized());
    policy.custom_id_field = Some("sku".to_string());
    let service = service_with(policy);
    let loaf = Document::builder("shop")
        .id("1")
        .attribute("sku", "A-7")
        .attribute("title", "bread")
        .build()
        .unwrap();
    let saved = service.save_and_index(INDEX, POLICY, loaf, false).unwrap();

    let bread = options(&[("keywords", "bread")]);
    assert_eq!(ids(&service.search(INDEX, POLICY, &bread, false, 1, 10).unwrap()), vec!["A-7"]);

    let revision = saved.revision().unwrap().to_string();
    assert!(service.delete_document(INDEX, "shop", "1", &revision).unwrap());
    assert_eq!(service.search(INDEX, POLICY, &bread, false, 1, 10).unwrap().total_hits, 0);
}

#[test]
fn test_reindex_of_emptied_database_clears_index() {
    let service = service();
    let mut saved = Vec::new();
    for (id, title) in [("1", "oak table"), ("2", "oak chair")] {
        saved.push(service.documents().save_document(product(id, title, "", 10), false).unwrap());
    }
    service.reindex_database(INDEX, POLICY, "shop", true).unwrap();
    assert_eq!(service.reader(INDEX).unwrap().num_docs(), 2);

    for document in &saved {
        service
            .documents()
            .delete_document("shop", document.id().unwrap(), document.revision().unwrap())
            .unwrap();
    }
    let outcome = service.reindex_database(INDEX, POLICY, "shop", true).unwrap();
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(service.reader(INDEX).unwrap().num_docs(), 0);
}
