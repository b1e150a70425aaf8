use std::sync::Arc;

use chrono::NaiveDate;

use quarry::analysis::AnalyzerRegistry;
use quarry::document::{AttributeValue, Document, document_from_str};
use quarry::index::{IndexReader, Indexer, RamDirectory};
use quarry::policy::{IndexField, IndexPolicy, QueryField, QueryPolicy};
use quarry::search::{QueryCriteria, QueryExecutor, SearchResults};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn indexer(directory: &RamDirectory, index_date: NaiveDate) -> Indexer {
    Indexer::new(Arc::new(directory.clone()), Arc::new(AnalyzerRegistry::new())).with_index_date(index_date)
}

fn executor() -> QueryExecutor {
    QueryExecutor::new(Arc::new(AnalyzerRegistry::new())).with_today(date(2024, 6, 1))
}

fn ids(results: &SearchResults) -> Vec<&str> {
    results.hits.iter().filter_map(|h| h.id()).collect()
}

fn text_policy() -> IndexPolicy {
    IndexPolicy::new().with_field(IndexField::new("title").tokenized())
}

fn titled(id: &str, title: &str) -> Document {
    Document::builder("bakery").id(id).attribute("title", title).build().unwrap()
}

#[test]
fn test_recency_boost_reorders_equal_matches() {
    let directory = RamDirectory::new("recency");
    indexer(&directory, date(2024, 5, 31))
        .index(&text_policy(), vec![titled("fresh", "sourdough bread")], false)
        .unwrap();
    indexer(&directory, date(2023, 1, 1))
        .index(&text_policy(), vec![titled("stale", "sourdough bread")], false)
        .unwrap();

    let reader = IndexReader::open(&directory).unwrap();
    let policy = QueryPolicy::new().with_field(QueryField::new("title"));
    let executor = executor();

    let plain = QueryCriteria::builder().keywords("bread").build().unwrap();
    let results = executor.search(&reader, &plain, &policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["stale", "fresh"]);
    assert!((results.hits[0].score - results.hits[1].score).abs() < 1e-6);

    let recent = QueryCriteria::builder().keywords("bread").recency(30, 2.0).build().unwrap();
    let results = executor.search(&reader, &recent, &policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["fresh", "stale"]);
    let ratio = results.hits[0].score / results.hits[1].score;
    assert!((ratio - (1.0 + 2.0 * 29.0 / 30.0)).abs() < 1e-3);

    let this_year = QueryCriteria::builder()
        .keywords("bread")
        .index_date_range(date(2024, 1, 1), date(2024, 12, 31))
        .build()
        .unwrap();
    let results = executor.search(&reader, &this_year, &policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["fresh"]);
}

#[test]
fn test_paths_markup_and_custom_ids() {
    let directory = RamDirectory::new("paths");
    let mut policy = IndexPolicy::new()
        .with_field(IndexField::new("tags[name]").tokenized())
        .with_field(IndexField::new("meta{color}"))
        .with_field(IndexField::new("description").html().analyzed());
    policy.custom_id_field = Some("sku".to_string());

    let document = document_from_str(
        "shop",
        r#"{
            "_id": "internal-1",
            "sku": "SKU-42",
            "tags": [{"name": "clearance"}, {"name": "winter"}],
            "meta": {"color": "navy"},
            "description": "<p>Warm <b>wool</b> scarf</p><script>track()</script>"
        }"#,
    )
    .unwrap();
    indexer(&directory, date(2024, 6, 1)).index(&policy, vec![document], false).unwrap();
    let reader = IndexReader::open(&directory).unwrap();

    let query_policy = QueryPolicy::new()
        .with_field(QueryField::new("tags[name]"))
        .with_field(QueryField::new("description"));
    let criteria = QueryCriteria::builder().keywords("winter").build().unwrap();
    let results = executor().search(&reader, &criteria, &query_policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["SKU-42"]);

    let hit = &results.hits[0].document;
    assert_eq!(hit.attribute("tags[name]"), Some(&AttributeValue::from("clearance winter")));
    assert_eq!(hit.attribute("meta{color}"), Some(&AttributeValue::from("navy")));
    let description = hit.attribute("description").map(AttributeValue::to_text).unwrap();
    assert!(!description.contains('<'));
    assert!(!description.contains("track"));

    let wool = QueryCriteria::builder().keywords("wool").build().unwrap();
    assert_eq!(
        executor().search(&reader, &wool, &query_policy, false, 1, 10).unwrap().total_hits,
        1
    );
}

#[test]
fn test_geo_radius_filter() {
    let directory = RamDirectory::new("geo");
    let policy = IndexPolicy::new()
        .with_field(IndexField::new("name").tokenized())
        .with_field(IndexField::new("location{lat}").latitude())
        .with_field(IndexField::new("location{lng}").longitude());
    let cafes = [
        r#"{"_id": "paris", "name": "corner cafe", "location": {"lat": 48.8566, "lng": 2.3522}}"#,
        r#"{"_id": "versailles", "name": "palace cafe", "location": {"lat": 48.8049, "lng": 2.1204}}"#,
        r#"{"_id": "lyon", "name": "river cafe", "location": {"lat": 45.7640, "lng": 4.8357}}"#,
    ];
    let documents = cafes
        .iter()
        .map(|json| document_from_str("places", json).unwrap())
        .collect::<Vec<_>>();
    indexer(&directory, date(2024, 6, 1)).index(&policy, documents, false).unwrap();
    let reader = IndexReader::open(&directory).unwrap();

    let query_policy = QueryPolicy::new().with_field(QueryField::new("name"));
    let near_paris = QueryCriteria::builder()
        .keywords("cafe")
        .latitude(48.8566)
        .longitude(2.3522)
        .radius_km(25.0)
        .build()
        .unwrap();
    let results = executor().search(&reader, &near_paris, &query_policy, false, 1, 10).unwrap();
    let mut found = ids(&results);
    found.sort_unstable();
    assert_eq!(found, vec!["paris", "versailles"]);
}

#[test]
fn test_sort_by_policy_sorting_field() {
    let directory = RamDirectory::new("sorting");
    let mut policy = text_policy();
    policy.sorting_field = Some("shelf".to_string());
    let loaves = [("rye", "c"), ("spelt", "a"), ("wheat", "b")]
        .into_iter()
        .map(|(id, shelf)| {
            Document::builder("bakery")
                .id(id)
                .attribute("title", "bread loaf")
                .attribute("shelf", shelf)
                .build()
                .unwrap()
        })
        .collect::<Vec<_>>();
    indexer(&directory, date(2024, 6, 1)).index(&policy, loaves, false).unwrap();
    let reader = IndexReader::open(&directory).unwrap();
    let query_policy = QueryPolicy::new().with_field(QueryField::new("title"));

    let by_shelf = QueryCriteria::builder()
        .keywords("bread")
        .sort_by_sorting_field(true)
        .build()
        .unwrap();
    let results = executor().search(&reader, &by_shelf, &query_policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["spelt", "wheat", "rye"]);

    let reversed = QueryCriteria::builder()
        .keywords("bread")
        .sort_by_sorting_field(false)
        .build()
        .unwrap();
    let results = executor().search(&reader, &reversed, &query_policy, false, 1, 10).unwrap();
    assert_eq!(ids(&results), vec!["rye", "wheat", "spelt"]);
}
