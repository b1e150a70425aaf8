//! Point-in-time contents of one index.
//!
//! A snapshot holds everything a search needs: the inverted index (one term
//! dictionary per field), stored values, numeric columns, field lengths for
//! BM25 normalization, term vectors and the spelling dictionary. Documents
//! are addressed by dense doc numbers assigned in insertion order.
//!
//! Snapshots are immutable once published. The writer mutates a private copy
//! and commits it as a whole; committing compacts away deleted documents,
//! so doc numbers are only stable within one snapshot.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::spelling::SpellingDictionary;

/// Internal document number.
pub type DocNumber = u32;

/// Occurrences of one term in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Document containing the term.
    pub doc: DocNumber,
    /// Token positions of every occurrence.
    pub positions: Vec<u32>,
}

impl Posting {
    /// Term frequency within the document.
    pub fn freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Per-field metadata and length statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Values were split with an analyzer.
    pub tokenized: bool,
    /// Analyzer used for tokenized values.
    pub analyzer: Option<String>,
    /// Live documents with at least one indexed value.
    pub doc_count: u32,
    /// Sum of field lengths over live documents.
    pub total_length: u64,
}

impl FieldInfo {
    /// Average field length over documents that have the field.
    pub fn average_length(&self) -> f32 {
        if self.doc_count == 0 {
            1.0
        } else {
            (self.total_length as f64 / self.doc_count as f64) as f32
        }
    }
}

/// Everything kept per document besides postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocEntry {
    /// Stored values in record order; names may repeat.
    pub stored: Vec<(String, String)>,
    /// First numeric value per field.
    pub numeric: HashMap<String, f64>,
    /// First untokenized value per field, used for sorting unstored keys.
    pub keywords: HashMap<String, String>,
    /// Indexed token count per field.
    pub field_lengths: HashMap<String, u32>,
    /// Field boost times record boost, for fields with a non-default weight.
    pub field_boosts: HashMap<String, f32>,
    /// Term frequencies per field for fields recorded with term vectors.
    pub term_vectors: HashMap<String, Vec<(String, u32)>>,
    /// `(database, id)` key, when the record carried both.
    pub key: Option<(String, String)>,
    /// Marked by a delete since the last commit.
    pub deleted: bool,
}

/// The inverted index and side tables of one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    generation: u64,
    docs: Vec<DocEntry>,
    postings: HashMap<String, BTreeMap<String, Vec<Posting>>>,
    field_infos: BTreeMap<String, FieldInfo>,
    keys: HashMap<String, DocNumber>,
    live_docs: u32,
    dictionary: SpellingDictionary,
}

fn key_of(database: &str, id: &str) -> String {
    format!("{database}\u{0}{id}")
}

impl IndexSnapshot {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit counter; increases with every commit.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One past the highest doc number, deleted documents included.
    pub fn max_doc(&self) -> DocNumber {
        self.docs.len() as DocNumber
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u32 {
        self.live_docs
    }

    /// Whether a doc number is deleted or out of range.
    pub fn is_deleted(&self, doc: DocNumber) -> bool {
        self.docs.get(doc as usize).is_none_or(|d| d.deleted)
    }

    /// Side tables of a live document.
    pub fn doc(&self, doc: DocNumber) -> Option<&DocEntry> {
        self.docs.get(doc as usize).filter(|d| !d.deleted)
    }

    /// Names of every field that was ever indexed or stored.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.field_infos.keys().map(String::as_str)
    }

    /// Metadata of one field.
    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        self.field_infos.get(field)
    }

    /// Term dictionary of one field.
    pub fn terms(&self, field: &str) -> Option<&BTreeMap<String, Vec<Posting>>> {
        self.postings.get(field)
    }

    /// Postings of one term; empty when unknown.
    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of live documents containing the term.
    pub fn doc_freq(&self, field: &str, term: &str) -> u32 {
        self.postings(field, term)
            .iter()
            .filter(|p| !self.is_deleted(p.doc))
            .count() as u32
    }

    /// Live document stored under `(database, id)`.
    pub fn find(&self, database: &str, id: &str) -> Option<DocNumber> {
        self.keys
            .get(&key_of(database, id))
            .copied()
            .filter(|doc| !self.is_deleted(*doc))
    }

    /// Spelling dictionary trained while indexing.
    pub fn dictionary(&self) -> &SpellingDictionary {
        &self.dictionary
    }

    pub(crate) fn dictionary_mut(&mut self) -> &mut SpellingDictionary {
        &mut self.dictionary
    }

    pub(crate) fn declare_field(&mut self, field: &str, tokenized: bool, analyzer: Option<&str>) {
        let info = self.field_infos.entry(field.to_string()).or_default();
        if tokenized {
            info.tokenized = true;
            if info.analyzer.is_none() {
                info.analyzer = analyzer.map(str::to_string);
            }
        }
    }

    /// Append a document with its analyzed terms and return its number.
    ///
    /// `terms` maps field to term to positions.
    pub(crate) fn push(
        &mut self,
        entry: DocEntry,
        terms: HashMap<String, HashMap<String, Vec<u32>>>,
    ) -> DocNumber {
        let doc = self.docs.len() as DocNumber;

        for (field, length) in &entry.field_lengths {
            let info = self.field_infos.entry(field.clone()).or_default();
            info.doc_count += 1;
            info.total_length += u64::from(*length);
        }
        for (field, field_terms) in terms {
            let dictionary = self.postings.entry(field).or_default();
            for (term, mut positions) in field_terms {
                positions.sort_unstable();
                dictionary
                    .entry(term)
                    .or_default()
                    .push(Posting { doc, positions });
            }
        }
        if let Some((database, id)) = &entry.key {
            self.keys.insert(key_of(database, id), doc);
        }

        self.docs.push(entry);
        self.live_docs += 1;
        doc
    }

    /// Mark a document deleted; false when it already was.
    pub(crate) fn delete(&mut self, doc: DocNumber) -> bool {
        let Some(entry) = self.docs.get_mut(doc as usize) else {
            return false;
        };
        if entry.deleted {
            return false;
        }
        entry.deleted = true;
        self.live_docs -= 1;

        for (field, length) in &entry.field_lengths {
            if let Some(info) = self.field_infos.get_mut(field) {
                info.doc_count = info.doc_count.saturating_sub(1);
                info.total_length = info.total_length.saturating_sub(u64::from(*length));
            }
        }
        if let Some((database, id)) = &entry.key {
            let key = key_of(database, id);
            if self.keys.get(&key) == Some(&doc) {
                self.keys.remove(&key);
            }
        }
        true
    }

    /// Number of documents marked deleted.
    pub fn deleted_docs(&self) -> u32 {
        self.max_doc() - self.live_docs
    }

    /// Drop deleted documents and renumber the rest densely.
    pub(crate) fn compact(&mut self) {
        if self.deleted_docs() == 0 {
            return;
        }

        let mut remap: Vec<Option<DocNumber>> = Vec::with_capacity(self.docs.len());
        let mut next = 0;
        for entry in &self.docs {
            if entry.deleted {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }

        self.docs.retain(|d| !d.deleted);
        for dictionary in self.postings.values_mut() {
            for postings in dictionary.values_mut() {
                postings.retain_mut(|p| match remap[p.doc as usize] {
                    Some(doc) => {
                        p.doc = doc;
                        true
                    }
                    None => false,
                });
            }
            dictionary.retain(|_, postings| !postings.is_empty());
        }
        self.postings.retain(|_, dictionary| !dictionary.is_empty());
        self.keys.retain(|_, doc| match remap[*doc as usize] {
            Some(new_doc) => {
                *doc = new_doc;
                true
            }
            None => false,
        });
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, length: u32) -> DocEntry {
        let mut entry = DocEntry {
            key: Some(("db".to_string(), id.to_string())),
            ..DocEntry::default()
        };
        entry.field_lengths.insert("body".to_string(), length);
        entry.stored.push(("id".to_string(), id.to_string()));
        entry
    }

    fn terms(words: &[&str]) -> HashMap<String, HashMap<String, Vec<u32>>> {
        let mut field = HashMap::new();
        for (position, word) in words.iter().enumerate() {
            field
                .entry(word.to_string())
                .or_insert_with(Vec::new)
                .push(position as u32);
        }
        HashMap::from([("body".to_string(), field)])
    }

    #[test]
    fn test_push_and_lookup() {
        let mut snapshot = IndexSnapshot::new();
        let a = snapshot.push(entry("a", 3), terms(&["red", "fox", "red"]));
        let b = snapshot.push(entry("b", 1), terms(&["fox"]));

        assert_eq!(snapshot.num_docs(), 2);
        assert_eq!(snapshot.postings("body", "red")[0].freq(), 2);
        assert_eq!(snapshot.doc_freq("body", "fox"), 2);
        assert_eq!(snapshot.find("db", "b"), Some(b));
        assert_eq!(snapshot.field_info("body").unwrap().average_length(), 2.0);
        assert!(!snapshot.is_deleted(a));
    }

    #[test]
    fn test_delete_and_compact() {
        let mut snapshot = IndexSnapshot::new();
        let a = snapshot.push(entry("a", 2), terms(&["red", "fox"]));
        snapshot.push(entry("b", 1), terms(&["fox"]));

        assert!(snapshot.delete(a));
        assert!(!snapshot.delete(a));
        assert_eq!(snapshot.doc_freq("body", "fox"), 1);
        assert_eq!(snapshot.find("db", "a"), None);
        assert_eq!(snapshot.deleted_docs(), 1);

        snapshot.compact();
        assert_eq!(snapshot.max_doc(), 1);
        assert_eq!(snapshot.find("db", "b"), Some(0));
        assert!(snapshot.terms("body").unwrap().get("red").is_none());
        assert_eq!(snapshot.postings("body", "fox")[0].doc, 0);
    }

    #[test]
    fn test_bincode_roundtrip() {
        let mut snapshot = IndexSnapshot::new();
        snapshot.push(entry("a", 2), terms(&["red", "fox"]));
        snapshot.dictionary_mut().increment_word("fox");

        let bytes = bincode::serialize(&snapshot).unwrap();
        let restored: IndexSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, snapshot);
    }
}
