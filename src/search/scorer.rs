//! BM25 term scoring.

use crate::index::{DocNumber, IndexReader};
use crate::search::explanation::Explanation;

/// Default BM25 `k1`.
pub const DEFAULT_K1: f32 = 1.2;

/// Default BM25 `b`.
pub const DEFAULT_B: f32 = 0.75;

/// Statistics of one term in one field, ready to score postings.
#[derive(Debug, Clone)]
pub struct BM25Scorer {
    field: String,
    term: String,
    doc_freq: u32,
    total_docs: u32,
    avg_field_length: f32,
    boost: f32,
    k1: f32,
    b: f32,
}

impl BM25Scorer {
    /// Gather the statistics of `term` in `field`.
    pub fn new(reader: &IndexReader, field: &str, term: &str, boost: f32) -> Self {
        BM25Scorer {
            field: field.to_string(),
            term: term.to_string(),
            doc_freq: reader.doc_freq(field, term),
            total_docs: reader.num_docs(),
            avg_field_length: reader.average_field_length(field),
            boost,
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }

    /// Weight of the term as `ln(1 + (N - df + 0.5) / (df + 0.5))`.
    ///
    /// Always positive, so terms present in every document still score.
    pub fn idf(&self) -> f32 {
        idf(self.doc_freq, self.total_docs)
    }

    fn tf_norm(&self, term_freq: f32, field_length: f32) -> f32 {
        if term_freq <= 0.0 {
            return 0.0;
        }
        let avg = if self.avg_field_length > 0.0 { self.avg_field_length } else { 1.0 };
        let norm = 1.0 - self.b + self.b * (field_length / avg);
        (term_freq * (self.k1 + 1.0)) / (term_freq + self.k1 * norm)
    }

    /// Score of a document containing the term `term_freq` times.
    ///
    /// Multiplied by the index-time boost of the field and record.
    pub fn score(&self, reader: &IndexReader, doc: DocNumber, term_freq: u32) -> f32 {
        let field_length = reader.field_length(doc, &self.field) as f32;
        self.boost
            * reader.field_boost(doc, &self.field)
            * self.idf()
            * self.tf_norm(term_freq as f32, field_length)
    }

    /// Same computation as [`score`](Self::score), as a tree.
    pub fn explain(&self, reader: &IndexReader, doc: DocNumber, term_freq: u32) -> Explanation {
        let field_length = reader.field_length(doc, &self.field) as f32;
        let index_boost = reader.field_boost(doc, &self.field);
        let idf = self.idf();
        let tf = self.tf_norm(term_freq as f32, field_length);
        Explanation::new(
            self.score(reader, doc, term_freq),
            format!("weight({}:{}) in doc {doc}, product of:", self.field, self.term),
        )
        .with_details([
            Explanation::new(self.boost, "query boost"),
            Explanation::new(index_boost, "index boost"),
            Explanation::new(
                idf,
                format!("idf, docFreq={}, numDocs={}", self.doc_freq, self.total_docs),
            ),
            Explanation::new(
                tf,
                format!(
                    "tf, freq={term_freq}, fieldLength={field_length}, avgFieldLength={}, k1={}, b={}",
                    self.avg_field_length, self.k1, self.b
                ),
            ),
        ])
    }
}

/// BM25 inverse document frequency.
pub fn idf(doc_freq: u32, total_docs: u32) -> f32 {
    if doc_freq == 0 || total_docs == 0 {
        return 0.0;
    }
    let n = total_docs as f32;
    let df = doc_freq as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}
