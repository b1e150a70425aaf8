//! Single-writer index mutation.
//!
//! An [`IndexWriter`] owns the write lock of its directory for its whole
//! life. It works on a private copy of the latest snapshot; readers keep
//! seeing the previous commit until [`IndexWriter::commit`] publishes the
//! copy.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::analysis::Analyzer;
use crate::error::{QuarryError, Result};
use crate::index::directory::{Directory, WriteLock};
use crate::index::record::IndexRecord;
use crate::index::snapshot::{DocEntry, DocNumber, IndexSnapshot};
use crate::spelling::SpellingDictionary;

/// Positions between two values of the same field, so phrases never match
/// across values.
const POSITION_GAP: u32 = 1;

/// Writer statistics since open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records added.
    pub added: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Commits performed.
    pub commits: u64,
}

/// A record turned into postings and side tables, not yet in any index.
///
/// Analysis needs no access to the index, so pooled writers run it on
/// worker threads and only take the writer lock to append.
#[derive(Debug, Clone)]
pub struct PreparedRecord {
    entry: DocEntry,
    terms: HashMap<String, HashMap<String, Vec<u32>>>,
    declared: Vec<(String, bool)>,
    words: Vec<String>,
}

impl PreparedRecord {
    /// Analyze `record`; `collect_words` keeps analyzed terms for dictionary training.
    pub fn analyze(
        analyzer: &dyn Analyzer,
        record: &IndexRecord,
        collect_words: bool,
    ) -> Result<Self> {
        let mut entry = DocEntry::default();
        let mut terms: HashMap<String, HashMap<String, Vec<u32>>> = HashMap::new();
        let mut vectors: HashMap<String, HashMap<String, u32>> = HashMap::new();
        let mut next_position: HashMap<String, u32> = HashMap::new();
        let mut declared: Vec<(String, bool)> = Vec::new();
        let mut words: Vec<String> = Vec::new();

        for field in record.fields() {
            if field.stored {
                entry.stored.push((field.name.clone(), field.value.clone()));
            }
            if let Some(number) = field.numeric {
                entry.numeric.entry(field.name.clone()).or_insert(number);
            }
            if !field.indexed {
                continue;
            }

            declared.push((field.name.clone(), field.tokenized));
            let boost = field.boost * record.boost;
            if (boost - 1.0).abs() > f32::EPSILON {
                let current = entry.field_boosts.entry(field.name.clone()).or_insert(boost);
                *current = current.max(boost);
            }

            let base = next_position.get(&field.name).copied().unwrap_or(0);
            let field_terms = terms.entry(field.name.clone()).or_default();
            let mut last = base;
            let mut length = 0u32;

            if field.tokenized {
                for token in analyzer.analyze(&field.value)? {
                    let position = base + token.position as u32;
                    last = position;
                    length += 1;
                    if field.term_vectors {
                        *vectors
                            .entry(field.name.clone())
                            .or_default()
                            .entry(token.text.clone())
                            .or_insert(0) += 1;
                    }
                    if collect_words {
                        words.push(token.text.clone());
                    }
                    field_terms.entry(token.text).or_default().push(position);
                }
            } else {
                field_terms.entry(field.value.clone()).or_default().push(base);
                entry
                    .keywords
                    .entry(field.name.clone())
                    .or_insert_with(|| field.value.clone());
                if field.term_vectors {
                    *vectors
                        .entry(field.name.clone())
                        .or_default()
                        .entry(field.value.clone())
                        .or_insert(0) += 1;
                }
                length = 1;
            }

            next_position.insert(field.name.clone(), last + 1 + POSITION_GAP);
            *entry.field_lengths.entry(field.name.clone()).or_insert(0) += length;
        }

        terms.retain(|_, field_terms| !field_terms.is_empty());
        entry.term_vectors = vectors
            .into_iter()
            .map(|(field, counts)| {
                let mut counts: Vec<(String, u32)> = counts.into_iter().collect();
                counts.sort();
                (field, counts)
            })
            .collect();
        if let Some((database, id)) = record.key() {
            entry.key = Some((database.to_string(), id.to_string()));
        }

        Ok(PreparedRecord {
            entry,
            terms,
            declared,
            words,
        })
    }

    /// `(database, id)` key of the record.
    pub fn key(&self) -> Option<(&str, &str)> {
        self.entry
            .key
            .as_ref()
            .map(|(database, id)| (database.as_str(), id.as_str()))
    }
}

/// Mutates one index; at most one per directory at a time.
#[derive(Debug)]
pub struct IndexWriter {
    directory: Arc<dyn Directory>,
    analyzer: Arc<dyn Analyzer>,
    snapshot: IndexSnapshot,
    lock: Option<WriteLock>,
    train_dictionary: bool,
    pending: usize,
    stats: WriterStats,
}

impl IndexWriter {
    /// Lock the directory and start from its latest commit.
    pub fn open(directory: Arc<dyn Directory>, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let lock = directory.obtain_lock()?;
        let snapshot = match directory.load()? {
            Some(snapshot) => Arc::unwrap_or_clone(snapshot),
            None => IndexSnapshot::new(),
        };
        debug!(
            "opened writer on {} at generation {}",
            directory.location(),
            snapshot.generation()
        );

        Ok(IndexWriter {
            directory,
            analyzer,
            snapshot,
            lock: Some(lock),
            train_dictionary: false,
            pending: 0,
            stats: WriterStats::default(),
        })
    }

    /// Feed analyzed text of added records into the spelling dictionary.
    pub fn set_train_dictionary(&mut self, enabled: bool) {
        self.train_dictionary = enabled;
    }

    /// Whether added records train the spelling dictionary.
    pub fn trains_dictionary(&self) -> bool {
        self.train_dictionary
    }

    /// Analyzer applied to tokenized fields.
    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Location of the written index.
    pub fn location(&self) -> String {
        self.directory.location()
    }

    /// Live documents including uncommitted changes.
    pub fn num_docs(&self) -> u32 {
        self.snapshot.num_docs()
    }

    /// Changes since the last commit.
    pub fn pending_changes(&self) -> usize {
        self.pending
    }

    /// Counters since open.
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    fn check_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(QuarryError::index("index writer is closed"));
        }
        Ok(())
    }

    /// Delete the record stored under `(database, id)`.
    pub fn delete_by_key(&mut self, database: &str, id: &str) -> Result<bool> {
        self.check_open()?;
        let Some(doc) = self.snapshot.find(database, id) else {
            return Ok(false);
        };
        let deleted = self.snapshot.delete(doc);
        if deleted {
            self.pending += 1;
            self.stats.deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete every record whose `field` holds exactly `term`.
    pub fn delete_by_term(&mut self, field: &str, term: &str) -> Result<u32> {
        self.check_open()?;
        let docs: Vec<DocNumber> = self
            .snapshot
            .postings(field, term)
            .iter()
            .map(|p| p.doc)
            .collect();

        let mut count = 0;
        for doc in docs {
            if self.snapshot.delete(doc) {
                count += 1;
            }
        }
        self.pending += count as usize;
        self.stats.deleted += u64::from(count);
        Ok(count)
    }

    /// Replace whatever is stored under the record's key, then add it.
    pub fn update_record(&mut self, record: IndexRecord) -> Result<DocNumber> {
        if let Some((database, id)) = record.key() {
            let (database, id) = (database.to_string(), id.to_string());
            self.delete_by_key(&database, &id)?;
        }
        self.add_record(record)
    }

    /// Analyze and append a record.
    pub fn add_record(&mut self, record: IndexRecord) -> Result<DocNumber> {
        self.check_open()?;
        let prepared = PreparedRecord::analyze(self.analyzer.as_ref(), &record, self.train_dictionary)?;
        self.add_prepared(prepared)
    }

    /// Append a record analyzed ahead of time, possibly on another thread.
    pub fn add_prepared(&mut self, prepared: PreparedRecord) -> Result<DocNumber> {
        self.check_open()?;
        let PreparedRecord {
            entry,
            terms,
            declared,
            words,
        } = prepared;

        for (field, tokenized) in &declared {
            self.snapshot
                .declare_field(field, *tokenized, Some(self.analyzer.name()));
        }
        if self.train_dictionary && !words.is_empty() {
            self.snapshot
                .dictionary_mut()
                .train(words.iter().map(String::as_str));
        }

        let doc = self.snapshot.push(entry, terms);
        self.pending += 1;
        self.stats.added += 1;
        Ok(doc)
    }

    /// Merge words into the spelling dictionary of this index.
    pub fn merge_dictionary(&mut self, dictionary: &SpellingDictionary) -> Result<()> {
        self.check_open()?;
        self.snapshot.dictionary_mut().merge(dictionary);
        self.pending += 1;
        Ok(())
    }

    /// Publish all changes as a new snapshot.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.snapshot.compact();
        self.snapshot.bump_generation();
        self.directory.store(&self.snapshot)?;
        debug!(
            "committed {} changes to {} (generation {}, {} docs)",
            self.pending,
            self.directory.location(),
            self.snapshot.generation(),
            self.snapshot.num_docs()
        );
        self.pending = 0;
        self.stats.commits += 1;
        Ok(())
    }

    /// Throw away uncommitted changes.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.snapshot = match self.directory.load()? {
            Some(snapshot) => Arc::unwrap_or_clone(snapshot),
            None => IndexSnapshot::new(),
        };
        self.pending = 0;
        Ok(())
    }

    /// Commit pending changes and release the lock.
    pub fn close(mut self) -> Result<WriterStats> {
        let result = if self.pending > 0 { self.commit() } else { Ok(()) };
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
        result.map(|_| self.stats.clone())
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.lock.is_some() && self.pending > 0 {
            warn!(
                "index writer on {} dropped with {} uncommitted changes",
                self.directory.location(),
                self.pending
            );
        }
    }
}
