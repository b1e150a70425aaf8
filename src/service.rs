//! Service facade over repositories, indexes and the query executor.
//!
//! A [`SearchService`] resolves policies by name from a
//! [`ConfigurationRepository`], keeps source documents in a
//! [`DocumentRepository`], and owns one directory per named index. Readers
//! are cached per index location and invalidated after every write, so a
//! search always sees the latest commit.
//!
//! The document store and the index are not updated atomically: when a save
//! succeeds and indexing fails, [`SearchService::reindex_database`] brings
//! the index back in line.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info};
use parking_lot::Mutex;

use crate::analysis::AnalyzerRegistry;
use crate::config::QuarryConfig;
use crate::document::Document;
use crate::error::{QuarryError, Result};
use crate::index::{
    CacheStats, Directory, FsDirectory, IndexCache, IndexOutcome, IndexReader, Indexer, RamDirectory,
};
use crate::repository::{ConfigurationRepository, DocumentRepository};
use crate::search::{
    ExplainedHit, QueryCriteria, QueryExecutor, RankedTerm, SearchResults, SimilarTo,
};

/// Documents read per repository page while reindexing.
const REINDEX_PAGE_SIZE: usize = 500;

/// Where index directories live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStorage {
    /// One directory per index under the configured index root.
    Disk,
    /// Process memory; nothing survives the service.
    Memory,
}

/// Entry point for indexing and searching named indexes.
#[derive(Debug)]
pub struct SearchService {
    config: QuarryConfig,
    storage: IndexStorage,
    documents: Arc<dyn DocumentRepository>,
    configuration: Arc<dyn ConfigurationRepository>,
    analyzers: Arc<AnalyzerRegistry>,
    executor: QueryExecutor,
    readers: IndexCache<IndexReader>,
    directories: Mutex<HashMap<String, Arc<dyn Directory>>>,
    index_date: Option<NaiveDate>,
}

impl SearchService {
    /// Create a service storing indexes as configured.
    pub fn new(
        config: QuarryConfig,
        storage: IndexStorage,
        documents: Arc<dyn DocumentRepository>,
        configuration: Arc<dyn ConfigurationRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let analyzers = Arc::new(AnalyzerRegistry::with_default(config.default_analyzer.as_str())?);
        let readers = IndexCache::new(config.cache_capacity)?.with_disposer(|location, reader: &IndexReader| {
            debug!("closing reader of {location} at generation {}", reader.generation());
        });
        Ok(SearchService {
            executor: QueryExecutor::from_config(&config, Arc::clone(&analyzers)),
            config,
            storage,
            documents,
            configuration,
            analyzers,
            readers,
            directories: Mutex::new(HashMap::new()),
            index_date: None,
        })
    }

    /// Stamp and age documents against a fixed date instead of today.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.index_date = Some(today);
        self.executor = self.executor.with_today(today);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Document repository.
    pub fn documents(&self) -> &Arc<dyn DocumentRepository> {
        &self.documents
    }

    /// Configuration repository.
    pub fn configuration(&self) -> &Arc<dyn ConfigurationRepository> {
        &self.configuration
    }

    fn directory(&self, index: &str) -> Result<Arc<dyn Directory>> {
        if index.trim().is_empty() || index.contains(['/', '\\']) {
            return Err(QuarryError::config(format!("invalid index name '{index}'")));
        }
        let mut directories = self.directories.lock();
        if let Some(directory) = directories.get(index) {
            return Ok(Arc::clone(directory));
        }
        let directory: Arc<dyn Directory> = match self.storage {
            IndexStorage::Disk => Arc::new(FsDirectory::open(self.config.index_location(index))?),
            IndexStorage::Memory => Arc::new(RamDirectory::new(index)),
        };
        directories.insert(index.to_string(), Arc::clone(&directory));
        Ok(directory)
    }

    fn indexer(&self, index: &str) -> Result<Indexer> {
        let indexer = Indexer::new(self.directory(index)?, Arc::clone(&self.analyzers));
        Ok(match self.index_date {
            Some(date) => indexer.with_index_date(date),
            None => indexer,
        })
    }

    /// Current reader of an index, opened on first use.
    pub fn reader(&self, index: &str) -> Result<Arc<IndexReader>> {
        let directory = self.directory(index)?;
        self.readers
            .get_or_open(&directory.location(), || IndexReader::open(directory.as_ref()))
    }

    /// Drop the cached reader of an index.
    pub fn invalidate(&self, index: &str) -> Result<bool> {
        let location = self.directory(index)?.location();
        Ok(self.readers.invalidate(&location))
    }

    /// Reader cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.readers.stats()
    }

    /// Close every cached reader.
    pub fn flush_cache(&self) {
        self.readers.flush();
        self.executor.clear_filters();
    }

    /// Save a document, then index it with the named index policy.
    ///
    /// Returns the saved document with its id and revision.
    pub fn save_and_index(
        &self,
        index: &str,
        policy_name: &str,
        document: Document,
        overwrite: bool,
    ) -> Result<Document> {
        let policy = self.configuration.get_index_policy(policy_name)?;
        let saved = self.documents.save_document(document, overwrite)?;
        let outcome = self.indexer(index)?.index_batch(&policy, [saved.clone()], false)?;
        self.invalidate(index)?;
        if outcome.failed > 0 {
            return Err(QuarryError::index(format!(
                "saved {}/{} but could not index it",
                saved.database(),
                saved.id().unwrap_or_default()
            )));
        }
        Ok(saved)
    }

    /// Index every stored document of a database.
    ///
    /// `delete_existing` first drops the database's records, so documents
    /// deleted from the store disappear from the index too.
    pub fn reindex_database(
        &self,
        index: &str,
        policy_name: &str,
        database: &str,
        delete_existing: bool,
    ) -> Result<IndexOutcome> {
        let policy = self.configuration.get_index_policy(policy_name)?;
        let mut documents = Vec::new();
        loop {
            let page = self
                .documents
                .get_all_documents(database, documents.len(), REINDEX_PAGE_SIZE)?;
            let done = page.len() < REINDEX_PAGE_SIZE;
            documents.extend(page);
            if done {
                break;
            }
        }
        info!("reindexing {} documents of {database} into {index}", documents.len());

        let indexer = self.indexer(index)?;
        if delete_existing {
            indexer.delete_database(database)?;
        }
        let outcome = if self.config.writer_threads > 1 && documents.len() > REINDEX_PAGE_SIZE {
            indexer.index_pooled(
                &policy,
                documents,
                false,
                self.config.writer_threads,
                self.config.writer_queue_capacity,
            )?
        } else {
            indexer.index_batch(&policy, documents, false)?
        };
        self.invalidate(index)?;
        Ok(outcome)
    }

    /// Fill the dictionary of `index` from the source named by a lookup
    /// policy. Returns the number of words merged, zero when the policy
    /// names no source.
    pub fn train_lookup_dictionary(&self, index: &str, lookup_name: &str) -> Result<usize> {
        let lookup = self.configuration.get_lookup_policy(lookup_name)?;
        let (Some(source), Some(field)) = (&lookup.dictionary_index, &lookup.dictionary_field) else {
            return Ok(0);
        };
        let reader = self.reader(source)?;
        let words = self.indexer(index)?.train_dictionary(&reader, field)?;
        self.invalidate(index)?;
        Ok(words)
    }

    fn criteria(&self, options: &HashMap<String, String>) -> Result<QueryCriteria> {
        QueryCriteria::from_options(options, &self.config.synonyms)
    }

    /// Search an index with string options (see [`crate::search::criteria::keys`]).
    pub fn search(
        &self,
        index: &str,
        policy_name: &str,
        options: &HashMap<String, String>,
        include_suggestions: bool,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        let criteria = self.criteria(options)?;
        self.search_criteria(index, policy_name, &criteria, include_suggestions, start, limit)
    }

    /// Search an index with prepared criteria.
    pub fn search_criteria(
        &self,
        index: &str,
        policy_name: &str,
        criteria: &QueryCriteria,
        include_suggestions: bool,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        let policy = self.configuration.get_query_policy(policy_name)?;
        let reader = self.reader(index)?;
        self.executor
            .search(&reader, criteria, &policy, include_suggestions, start, limit)
    }

    /// Autocomplete values for partially typed keywords.
    pub fn partial_lookup(
        &self,
        index: &str,
        lookup_name: &str,
        options: &HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let lookup = self.configuration.get_lookup_policy(lookup_name)?;
        let criteria = self.criteria(options)?;
        let reader = self.reader(index)?;
        self.executor.partial_lookup(&reader, &criteria, &lookup, limit)
    }

    /// Documents similar to `source`.
    pub fn more_like_this(
        &self,
        index: &str,
        policy_name: &str,
        source: &SimilarTo,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        let policy = self.configuration.get_query_policy(policy_name)?;
        let reader = self.reader(index)?;
        self.executor.more_like_this(&reader, source, &policy, start, limit)
    }

    /// Hits with their scoring explanations.
    pub fn explain_search(
        &self,
        index: &str,
        policy_name: &str,
        options: &HashMap<String, String>,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ExplainedHit>> {
        let policy = self.configuration.get_query_policy(policy_name)?;
        let criteria = self.criteria(options)?;
        let reader = self.reader(index)?;
        self.executor.explain_search(&reader, &criteria, &policy, start, limit)
    }

    /// Most frequent terms of `fields`, or of the policy fields.
    pub fn top_ranking_terms(
        &self,
        index: &str,
        policy_name: &str,
        fields: &[String],
        limit: usize,
    ) -> Result<Vec<RankedTerm>> {
        let policy = self.configuration.get_query_policy(policy_name)?;
        let reader = self.reader(index)?;
        Ok(self.executor.top_ranking_terms(&reader, &policy, fields, limit))
    }

    /// Delete a document from the store and from the index.
    pub fn delete_document(&self, index: &str, database: &str, id: &str, revision: &str) -> Result<bool> {
        self.documents.delete_document(database, id, revision)?;
        let removed = self.indexer(index)?.delete(database, id)?;
        self.invalidate(index)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{IndexField, IndexPolicy, QueryField, QueryPolicy};
    use crate::repository::{InMemoryConfigurationRepository, InMemoryDocumentRepository};

    fn service() -> SearchService {
        let configuration = Arc::new(InMemoryConfigurationRepository::new());
        configuration
            .save_index_policy(
                "articles",
                &IndexPolicy::new().with_field(IndexField::new("title").tokenized()),
            )
            .unwrap();
        configuration
            .save_query_policy("articles", &QueryPolicy::new().with_field(QueryField::new("title")))
            .unwrap();
        SearchService::new(
            QuarryConfig::default(),
            IndexStorage::Memory,
            Arc::new(InMemoryDocumentRepository::new()),
            configuration,
        )
        .unwrap()
    }

    fn keywords(value: &str) -> HashMap<String, String> {
        HashMap::from([("keywords".to_string(), value.to_string())])
    }

    #[test]
    fn test_saved_documents_are_searchable() {
        let service = service();
        let doc = Document::builder("blog")
            .id("1")
            .attribute("title", "Lifetimes in practice")
            .build()
            .unwrap();
        service.save_and_index("articles", "articles", doc, false).unwrap();

        let results = service
            .search("articles", "articles", &keywords("lifetimes"), false, 1, 10)
            .unwrap();
        assert_eq!(results.total_hits, 1);

        // a write invalidates the cached reader
        let doc = Document::builder("blog")
            .id("2")
            .attribute("title", "More lifetimes")
            .build()
            .unwrap();
        service.save_and_index("articles", "articles", doc, false).unwrap();
        let results = service
            .search("articles", "articles", &keywords("lifetimes"), false, 1, 10)
            .unwrap();
        assert_eq!(results.total_hits, 2);
        assert!(service.cache_stats().misses >= 2);
    }

    #[test]
    fn test_delete_removes_from_store_and_index() {
        let service = service();
        let doc = Document::builder("blog").id("1").attribute("title", "gone soon").build().unwrap();
        let saved = service.save_and_index("articles", "articles", doc, false).unwrap();

        assert!(service
            .delete_document("articles", "blog", "1", saved.revision().unwrap())
            .unwrap());
        let results = service
            .search("articles", "articles", &keywords("gone"), false, 1, 10)
            .unwrap();
        assert_eq!(results.total_hits, 0);
    }

    #[test]
    fn test_unknown_policy_is_not_found() {
        let service = service();
        let err = service
            .search("articles", "missing", &keywords("x"), false, 1, 10)
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(service.reader("../escape").is_err());
    }
}
