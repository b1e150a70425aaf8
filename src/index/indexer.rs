//! Policy-driven indexing of documents.
//!
//! The [`Indexer`] turns documents into [`IndexRecord`]s according to an
//! [`IndexPolicy`] and writes them with delete-then-insert semantics keyed
//! by `(database, id)`, so reindexing a document never duplicates it. One
//! bad document never aborts a batch: it is logged and counted as a miss.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};

use crate::analysis::AnalyzerRegistry;
use crate::analysis::html::html_to_text;
use crate::document::path::normalize_punctuation;
use crate::document::{Document, FieldPath};
use crate::error::{QuarryError, Result};
use crate::index::directory::Directory;
use crate::index::pooled::PooledIndexWriter;
use crate::index::reader::IndexReader;
use crate::index::record::{
    ALL_OWNER, DATABASE_FIELD, ID_FIELD, INDEX_DATE_FIELD, INDEX_DATE_FORMAT, IndexRecord,
    IndexableField, KEY_FIELD, LATITUDE_FIELD, LONGITUDE_FIELD, OWNER_FIELD, SCORE_FIELD, SORT_FIELD,
};
use crate::index::writer::IndexWriter;
use crate::policy::{IndexField, IndexPolicy};
use crate::spelling::SpellingDictionary;

/// An index policy with its paths parsed once per batch.
#[derive(Debug)]
struct CompiledPolicy<'a> {
    policy: &'a IndexPolicy,
    fields: Vec<(&'a IndexField, FieldPath)>,
    sorting: Option<FieldPath>,
    custom_id: Option<FieldPath>,
}

impl<'a> CompiledPolicy<'a> {
    fn compile(policy: &'a IndexPolicy) -> Result<Self> {
        policy.validate()?;
        let fields = policy
            .fields()
            .iter()
            .map(|field| Ok((field, FieldPath::parse(&field.name)?)))
            .collect::<Result<Vec<_>>>()?;
        let sorting = policy.sorting_field.as_deref().map(FieldPath::parse).transpose()?;
        let custom_id = policy
            .custom_id_field
            .as_deref()
            .map(FieldPath::parse)
            .transpose()?;
        Ok(CompiledPolicy {
            policy,
            fields,
            sorting,
            custom_id,
        })
    }
}

/// Outcome of one indexing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Documents written.
    pub succeeded: usize,
    /// Documents skipped because of an error.
    pub failed: usize,
}

/// Writes documents into one index according to a policy.
#[derive(Debug, Clone)]
pub struct Indexer {
    directory: Arc<dyn Directory>,
    analyzers: Arc<AnalyzerRegistry>,
    index_date: Option<NaiveDate>,
}

impl Indexer {
    /// Create an indexer for the index stored in `directory`.
    pub fn new(directory: Arc<dyn Directory>, analyzers: Arc<AnalyzerRegistry>) -> Self {
        Indexer {
            directory,
            analyzers,
            index_date: None,
        }
    }

    /// Stamp records with a fixed date instead of today.
    pub fn with_index_date(mut self, date: NaiveDate) -> Self {
        self.index_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.index_date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Build the record of one document.
    pub fn build_record(&self, policy: &IndexPolicy, document: &Document) -> Result<IndexRecord> {
        let compiled = CompiledPolicy::compile(policy)?;
        build_record(&compiled, document, self.today())
    }

    fn open_writer(&self, policy: &IndexPolicy) -> Result<IndexWriter> {
        let analyzer = self.analyzers.get(policy.analyzer.as_deref())?;
        let mut writer = IndexWriter::open(Arc::clone(&self.directory), analyzer)?;
        writer.set_train_dictionary(policy.add_to_dictionary);
        Ok(writer)
    }

    /// Index a batch of documents and return how many were written.
    ///
    /// Every document replaces the record with its `(database, id)`.
    /// `delete_existing` first removes every record of the databases seen in
    /// the batch, for full rebuilds. The writer is committed and closed
    /// exactly once.
    pub fn index<I>(&self, policy: &IndexPolicy, documents: I, delete_existing: bool) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        Ok(self.index_batch(policy, documents, delete_existing)?.succeeded)
    }

    /// Like [`index`](Self::index), reporting failures too.
    pub fn index_batch<I>(
        &self,
        policy: &IndexPolicy,
        documents: I,
        delete_existing: bool,
    ) -> Result<IndexOutcome>
    where
        I: IntoIterator<Item = Document>,
    {
        let compiled = CompiledPolicy::compile(policy)?;
        let today = self.today();
        let mut writer = self.open_writer(policy)?;
        let mut cleared: Vec<String> = Vec::new();
        let mut outcome = IndexOutcome::default();

        for document in documents {
            if delete_existing && !cleared.iter().any(|db| db == document.database()) {
                match writer.delete_by_term(DATABASE_FIELD, document.database()) {
                    Ok(count) => debug!("cleared {count} records of {}", document.database()),
                    Err(e) => warn!("failed to clear {}: {e}", document.database()),
                }
                cleared.push(document.database().to_string());
            }

            let result = build_record(&compiled, &document, today).and_then(|record| {
                writer.update_record(record)?;
                Ok(())
            });
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        "failed to index {}/{}: {e}",
                        document.database(),
                        document.id().unwrap_or("<no id>")
                    );
                }
            }
        }

        writer.close()?;
        info!(
            "indexed {} documents into {} ({} failed)",
            outcome.succeeded,
            self.directory.location(),
            outcome.failed
        );
        Ok(outcome)
    }

    /// Index a batch through a [`PooledIndexWriter`].
    ///
    /// Record building happens on the calling thread; analysis and writes
    /// happen on `threads` workers behind a queue of `queue_capacity`.
    pub fn index_pooled<I>(
        &self,
        policy: &IndexPolicy,
        documents: I,
        delete_existing: bool,
        threads: usize,
        queue_capacity: usize,
    ) -> Result<IndexOutcome>
    where
        I: IntoIterator<Item = Document>,
    {
        let compiled = CompiledPolicy::compile(policy)?;
        let today = self.today();
        let mut writer = self.open_writer(policy)?;

        let documents: Vec<Document> = documents.into_iter().collect();
        if delete_existing {
            let mut databases: Vec<&str> = documents.iter().map(Document::database).collect();
            databases.sort_unstable();
            databases.dedup();
            for database in databases {
                writer.delete_by_term(DATABASE_FIELD, database)?;
            }
        }

        let pool = PooledIndexWriter::new(writer, threads, queue_capacity)?;
        let mut build_failures = 0;
        for document in &documents {
            let label = format!("{}/{}", document.database(), document.id().unwrap_or("<no id>"));
            match build_record(&compiled, document, today) {
                Ok(record) => pool.submit(record, true, label)?,
                Err(e) => {
                    build_failures += 1;
                    warn!("failed to index {label}: {e}");
                }
            }
        }

        let (stats, _) = pool.finish()?;
        let outcome = IndexOutcome {
            succeeded: stats.succeeded,
            failed: stats.failed + build_failures,
        };
        info!(
            "indexed {} documents into {} with {threads} workers ({} failed, {} ran on caller)",
            outcome.succeeded,
            self.directory.location(),
            outcome.failed,
            stats.caller_runs
        );
        Ok(outcome)
    }

    /// Remove one document from the index.
    pub fn delete(&self, database: &str, id: &str) -> Result<bool> {
        let analyzer = self.analyzers.get(None)?;
        let mut writer = IndexWriter::open(Arc::clone(&self.directory), analyzer)?;
        let deleted = writer.delete_by_key(database, id)?;
        writer.close()?;
        Ok(deleted)
    }

    /// Remove every record of a database. Returns the number removed.
    pub fn delete_database(&self, database: &str) -> Result<u32> {
        let analyzer = self.analyzers.get(None)?;
        let mut writer = IndexWriter::open(Arc::clone(&self.directory), analyzer)?;
        let deleted = writer.delete_by_term(DATABASE_FIELD, database)?;
        writer.close()?;
        debug!("cleared {deleted} records of {database} from {}", self.directory.location());
        Ok(deleted)
    }

    /// Copy the terms of `field` in `source` into this index's spelling
    /// dictionary, weighted by document frequency. Returns the number of
    /// words merged.
    pub fn train_dictionary(&self, source: &IndexReader, field: &str) -> Result<usize> {
        let mut dictionary = SpellingDictionary::new();
        for term in source.terms(field) {
            let frequency = source.doc_freq(field, term);
            if frequency > 0 {
                dictionary.add_word(term, frequency);
            }
        }
        if dictionary.is_empty() {
            return Ok(0);
        }

        let analyzer = self.analyzers.get(None)?;
        let mut writer = IndexWriter::open(Arc::clone(&self.directory), analyzer)?;
        writer.merge_dictionary(&dictionary)?;
        writer.close()?;
        Ok(dictionary.word_count())
    }
}

fn parse_coordinate(field: &IndexField, value: &str, range: f64) -> Result<f64> {
    let degrees: f64 = value.trim().parse().map_err(|_| {
        QuarryError::index(format!("field '{}' is not a coordinate: {value}", field.name))
    })?;
    if !degrees.is_finite() || degrees.abs() > range {
        return Err(QuarryError::index(format!(
            "field '{}' is out of range: {degrees}",
            field.name
        )));
    }
    Ok(degrees)
}

fn build_record(compiled: &CompiledPolicy<'_>, document: &Document, today: NaiveDate) -> Result<IndexRecord> {
    let policy = compiled.policy;
    let attributes = document.attributes();
    let document_id = document.require_id()?;
    let custom_id = compiled.custom_id.as_ref().and_then(|path| path.resolve(attributes));

    let mut record = IndexRecord::new()
        .with_field(IndexableField::keyword(DATABASE_FIELD, document.database()))
        .with_field(IndexableField::keyword(
            ID_FIELD,
            custom_id.as_deref().unwrap_or(document_id),
        ))
        .with_field(IndexableField::keyword(
            INDEX_DATE_FIELD,
            today.format(INDEX_DATE_FORMAT).to_string(),
        ))
        .with_field(
            IndexableField::keyword(OWNER_FIELD, policy.owner.as_deref().unwrap_or(ALL_OWNER))
                .unstored(),
        );

    // hits report the custom id, deletes and replacements use the store id
    if custom_id.is_some() {
        record.add(IndexableField::keyword(KEY_FIELD, document_id).unstored());
    }
    if policy.score > 0 {
        record.add(IndexableField::numeric(SCORE_FIELD, f64::from(policy.score)));
    }
    if policy.boost > 0.0 {
        record.boost = policy.boost;
    }
    if let Some(value) = compiled.sorting.as_ref().and_then(|path| path.resolve(attributes)) {
        let mut field = IndexableField::keyword(SORT_FIELD, value.clone()).unstored();
        if let Ok(number) = value.parse::<f64>() {
            field = field.with_numeric(number);
        }
        record.add(field);
    }

    for (field, path) in &compiled.fields {
        let resolved = if field.html_to_text {
            path.resolve_raw(attributes)
                .map(|raw| normalize_punctuation(&html_to_text(&raw)))
        } else {
            path.resolve(attributes)
        };
        let Some(value) = resolved.filter(|v| !v.is_empty()) else {
            continue;
        };

        if field.spatial_latitude {
            let degrees = parse_coordinate(field, &value, 90.0)?;
            record.add(IndexableField::numeric(LATITUDE_FIELD, degrees).stored_only());
        }
        if field.spatial_longitude {
            let degrees = parse_coordinate(field, &value, 180.0)?;
            record.add(IndexableField::numeric(LONGITUDE_FIELD, degrees).stored_only());
        }

        let numeric = value.trim().parse::<f64>().ok().filter(|n| n.is_finite());
        let mut indexed = if field.tokenize {
            IndexableField::text(field.name.as_str(), value).with_term_vectors()
        } else if field.analyze {
            IndexableField::text(field.name.as_str(), value)
        } else {
            IndexableField::keyword(field.name.as_str(), value)
        };
        if let Some(number) = numeric {
            indexed = indexed.with_numeric(number);
        }
        if !field.store_in_index {
            indexed = indexed.unstored();
        }
        if field.boost != 0.0 {
            indexed = indexed.with_boost(field.boost);
        }
        record.add(indexed);
    }

    Ok(record)
}
