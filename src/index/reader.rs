//! Read-only view of a committed index.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::index::directory::Directory;
use crate::index::snapshot::{DocNumber, FieldInfo, IndexSnapshot, Posting};
use crate::spelling::SpellingDictionary;

/// Point-in-time reader; clones share the same snapshot.
///
/// Never sees changes committed after it was opened.
#[derive(Debug, Clone)]
pub struct IndexReader {
    snapshot: Arc<IndexSnapshot>,
    location: String,
}

impl IndexReader {
    /// Open the latest commit of a directory; an uncommitted index reads as empty.
    pub fn open(directory: &dyn Directory) -> Result<Self> {
        let snapshot = directory.load()?.unwrap_or_default();
        Ok(IndexReader {
            snapshot,
            location: directory.location(),
        })
    }

    /// Wrap an existing snapshot.
    pub fn from_snapshot<S: Into<String>>(snapshot: Arc<IndexSnapshot>, location: S) -> Self {
        IndexReader {
            snapshot,
            location: location.into(),
        }
    }

    /// Location the reader was opened from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Commit generation of the snapshot.
    pub fn generation(&self) -> u64 {
        self.snapshot.generation()
    }

    /// Live documents.
    pub fn num_docs(&self) -> u32 {
        self.snapshot.num_docs()
    }

    /// Upper bound of doc numbers.
    pub fn max_doc(&self) -> DocNumber {
        self.snapshot.max_doc()
    }

    /// Live doc numbers in ascending order.
    pub fn live_docs(&self) -> impl Iterator<Item = DocNumber> + '_ {
        (0..self.snapshot.max_doc()).filter(|doc| !self.snapshot.is_deleted(*doc))
    }

    /// Whether a doc number is deleted or out of range.
    pub fn is_deleted(&self, doc: DocNumber) -> bool {
        self.snapshot.is_deleted(doc)
    }

    /// Field names known to the index.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.snapshot.fields()
    }

    /// Metadata of one field.
    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        self.snapshot.field_info(field)
    }

    /// Whether values of `field` were analyzed.
    pub fn is_tokenized(&self, field: &str) -> bool {
        self.field_info(field).is_some_and(|info| info.tokenized)
    }

    /// Terms of a field in lexicographic order.
    pub fn terms(&self, field: &str) -> impl Iterator<Item = &str> {
        self.snapshot
            .terms(field)
            .into_iter()
            .flat_map(|terms| terms.keys().map(String::as_str))
    }

    /// Terms of a field starting with `prefix`, in order.
    pub fn terms_with_prefix<'a>(&'a self, field: &str, prefix: &'a str) -> Vec<&'a str> {
        let Some(terms) = self.snapshot.terms(field) else {
            return Vec::new();
        };
        terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(term, _)| term.as_str())
            .take_while(|term| term.starts_with(prefix))
            .collect()
    }

    /// Postings of a term, deleted documents included.
    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.snapshot.postings(field, term)
    }

    /// Live documents containing the term.
    pub fn doc_freq(&self, field: &str, term: &str) -> u32 {
        self.snapshot.doc_freq(field, term)
    }

    /// Stored values of a document in record order.
    pub fn stored_fields(&self, doc: DocNumber) -> &[(String, String)] {
        self.snapshot
            .doc(doc)
            .map(|d| d.stored.as_slice())
            .unwrap_or(&[])
    }

    /// First stored value of a field.
    pub fn stored_value(&self, doc: DocNumber, field: &str) -> Option<&str> {
        self.stored_fields(doc)
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Numeric column value.
    pub fn doc_value(&self, doc: DocNumber, field: &str) -> Option<f64> {
        self.snapshot.doc(doc)?.numeric.get(field).copied()
    }

    /// Value used to sort by `field`: stored value first, then the
    /// untokenized indexed value.
    pub fn sort_value(&self, doc: DocNumber, field: &str) -> Option<&str> {
        self.stored_value(doc, field).or_else(|| {
            self.snapshot
                .doc(doc)?
                .keywords
                .get(field)
                .map(String::as_str)
        })
    }

    /// Indexed token count of a field in one document.
    pub fn field_length(&self, doc: DocNumber, field: &str) -> u32 {
        self.snapshot
            .doc(doc)
            .and_then(|d| d.field_lengths.get(field).copied())
            .unwrap_or(0)
    }

    /// Combined field and record boost.
    pub fn field_boost(&self, doc: DocNumber, field: &str) -> f32 {
        self.snapshot
            .doc(doc)
            .and_then(|d| d.field_boosts.get(field).copied())
            .unwrap_or(1.0)
    }

    /// Average field length over documents having the field.
    pub fn average_field_length(&self, field: &str) -> f32 {
        self.field_info(field)
            .map(FieldInfo::average_length)
            .unwrap_or(1.0)
    }

    /// Term frequencies of a field in one document, when recorded.
    pub fn term_vector(&self, doc: DocNumber, field: &str) -> Option<&[(String, u32)]> {
        self.snapshot
            .doc(doc)?
            .term_vectors
            .get(field)
            .map(Vec::as_slice)
    }

    /// Doc number of `(database, id)`.
    pub fn find_doc(&self, database: &str, id: &str) -> Option<DocNumber> {
        self.snapshot.find(database, id)
    }

    /// Spelling dictionary of the index.
    pub fn dictionary(&self) -> &SpellingDictionary {
        self.snapshot.dictionary()
    }
}
