//! "More like this" queries built from the terms of an indexed document.

use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::AnalyzerRegistry;
use crate::error::{QuarryError, Result};
use crate::index::{DocNumber, IndexReader};
use crate::search::query::{Occur, Query};
use crate::search::scorer::idf;

/// Document a similarity query starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimilarTo {
    /// External identity.
    Key { database: String, id: String },
    /// Internal document number of the current snapshot.
    Doc(DocNumber),
}

impl SimilarTo {
    /// Source given by database and id.
    pub fn key<D: Into<String>, I: Into<String>>(database: D, id: I) -> Self {
        SimilarTo::Key {
            database: database.into(),
            id: id.into(),
        }
    }

    /// Resolve to a live document number.
    pub fn resolve(&self, reader: &IndexReader) -> Result<DocNumber> {
        let doc = match self {
            SimilarTo::Key { database, id } => reader.find_doc(database, id).ok_or_else(|| {
                QuarryError::search(format!("document {database}/{id} is not indexed"))
            })?,
            SimilarTo::Doc(doc) => *doc,
        };
        if reader.is_deleted(doc) {
            return Err(QuarryError::search(format!("document {doc} is not live")));
        }
        Ok(doc)
    }
}

/// A term chosen to describe the source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestingTerm {
    pub field: String,
    pub term: String,
    /// `tf * idf` of the term in the source document.
    pub score: f32,
}

/// Selects characteristic terms of a document and queries for them.
#[derive(Debug, Clone)]
pub struct MoreLikeThis {
    min_term_freq: u32,
    min_doc_freq: u32,
    max_query_terms: usize,
}

impl Default for MoreLikeThis {
    fn default() -> Self {
        MoreLikeThis {
            min_term_freq: 1,
            min_doc_freq: 1,
            max_query_terms: 25,
        }
    }
}

impl MoreLikeThis {
    /// Defaults: terms seen once, in at least one document, 25 terms at most.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore terms occurring fewer times in the source document.
    pub fn with_min_term_freq(mut self, min_term_freq: u32) -> Self {
        self.min_term_freq = min_term_freq;
        self
    }

    /// Ignore terms present in fewer documents.
    pub fn with_min_doc_freq(mut self, min_doc_freq: u32) -> Self {
        self.min_doc_freq = min_doc_freq;
        self
    }

    /// Keep at most this many terms.
    pub fn with_max_query_terms(mut self, max_query_terms: usize) -> Self {
        self.max_query_terms = max_query_terms;
        self
    }

    fn term_frequencies(
        reader: &IndexReader,
        analyzers: &AnalyzerRegistry,
        doc: DocNumber,
        field: &str,
    ) -> Result<HashMap<String, u32>> {
        if let Some(vector) = reader.term_vector(doc, field) {
            return Ok(vector.iter().cloned().collect());
        }

        let mut frequencies = HashMap::new();
        if reader.is_tokenized(field) {
            let analyzer_name = reader.field_info(field).and_then(|i| i.analyzer.as_deref());
            let analyzer = analyzers.get(analyzer_name)?;
            for (_, value) in reader.stored_fields(doc).iter().filter(|(name, _)| name == field) {
                for term in analyzer.terms(value)? {
                    *frequencies.entry(term).or_insert(0) += 1;
                }
            }
        } else if let Some(value) = reader.sort_value(doc, field) {
            frequencies.insert(value.to_string(), 1);
        }
        Ok(frequencies)
    }

    /// Best terms of `doc` over `fields`, highest score first.
    pub fn interesting_terms(
        &self,
        reader: &IndexReader,
        analyzers: &AnalyzerRegistry,
        doc: DocNumber,
        fields: &[&str],
    ) -> Result<Vec<InterestingTerm>> {
        let total_docs = reader.num_docs();
        let mut terms = Vec::new();
        for &field in fields {
            for (term, tf) in Self::term_frequencies(reader, analyzers, doc, field)? {
                let df = reader.doc_freq(field, &term);
                if tf < self.min_term_freq || df < self.min_doc_freq {
                    continue;
                }
                terms.push(InterestingTerm {
                    field: field.to_string(),
                    score: tf as f32 * idf(df, total_docs),
                    term,
                });
            }
        }
        terms.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.field.cmp(&b.field))
                .then_with(|| a.term.cmp(&b.term))
        });
        terms.truncate(self.max_query_terms);
        Ok(terms)
    }

    /// Disjunction of the interesting terms, each boosted relative to the best.
    pub fn query(
        &self,
        reader: &IndexReader,
        analyzers: &AnalyzerRegistry,
        doc: DocNumber,
        fields: &[&str],
    ) -> Result<Query> {
        let terms = self.interesting_terms(reader, analyzers, doc, fields)?;
        let best = terms.first().map(|t| t.score).unwrap_or(1.0);
        let mut query = Query::boolean();
        for term in terms {
            let boost = if best > 0.0 { term.score / best } else { 1.0 };
            query.add_clause(
                Occur::Should,
                Query::term(term.field, term.term).with_boost(boost),
            );
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::index::record::{DATABASE_FIELD, ID_FIELD, IndexRecord, IndexableField};
    use crate::index::{IndexWriter, RamDirectory};
    use crate::search::filter::Filter;
    use crate::search::searcher::Searcher;
    use std::sync::Arc;

    fn reader() -> IndexReader {
        let directory = RamDirectory::new("mlt");
        let mut writer =
            IndexWriter::open(Arc::new(directory.clone()), Arc::new(StandardAnalyzer::new()))
                .unwrap();
        let rows = [
            ("1", "rust borrow checker lifetimes"),
            ("2", "rust lifetimes explained"),
            ("3", "gardening tomatoes in spring"),
            ("4", "rust async runtimes"),
        ];
        for (id, body) in rows {
            writer
                .add_record(
                    IndexRecord::new()
                        .with_field(IndexableField::keyword(DATABASE_FIELD, "blog"))
                        .with_field(IndexableField::keyword(ID_FIELD, id))
                        .with_field(IndexableField::text("body", body).with_term_vectors())
                        .with_field(IndexableField::text("plain", body)),
                )
                .unwrap();
        }
        writer.close().unwrap();
        IndexReader::open(&directory).unwrap()
    }

    #[test]
    fn test_similar_documents_rank_first() {
        let reader = reader();
        let analyzers = AnalyzerRegistry::new();
        let source = SimilarTo::key("blog", "1").resolve(&reader).unwrap();
        let query = MoreLikeThis::new()
            .query(&reader, &analyzers, source, &["body"])
            .unwrap();

        let others = Filter::Exclude(source).doc_set(&reader);
        let hits = Searcher::new(&reader).search_all(&query, Some(&others));
        let ids: Vec<&str> = hits
            .iter()
            .filter_map(|h| reader.stored_value(h.doc, ID_FIELD))
            .collect();
        assert_eq!(ids, vec!["2", "4"]);
    }

    #[test]
    fn test_terms_without_vectors_are_reanalyzed() {
        let reader = reader();
        let analyzers = AnalyzerRegistry::new();
        let with_vectors = MoreLikeThis::new()
            .interesting_terms(&reader, &analyzers, 0, &["body"])
            .unwrap();
        let reanalyzed = MoreLikeThis::new()
            .interesting_terms(&reader, &analyzers, 0, &["plain"])
            .unwrap();

        let words = |terms: &[InterestingTerm]| {
            let mut words: Vec<String> = terms.iter().map(|t| t.term.clone()).collect();
            words.sort();
            words
        };
        assert_eq!(words(&with_vectors), words(&reanalyzed));
        assert_eq!(with_vectors[0].term, "borrow");
    }

    #[test]
    fn test_unknown_source() {
        let reader = reader();
        assert!(SimilarTo::key("blog", "99").resolve(&reader).is_err());
        assert!(MoreLikeThis::new().with_max_query_terms(1).max_query_terms == 1);
    }
}
