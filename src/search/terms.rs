//! Frequency-ranked term listings.

use serde::{Deserialize, Serialize};

use crate::index::IndexReader;

/// A term and the number of live documents containing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedTerm {
    /// Field the term was indexed under.
    pub name: String,
    /// Term text.
    pub value: String,
    /// Live document frequency.
    pub frequency: u32,
}

/// The `limit` most frequent terms over `fields`, most frequent first.
///
/// Ties are broken by term text, then by field name.
pub fn top_ranking_terms(reader: &IndexReader, fields: &[&str], limit: usize) -> Vec<RankedTerm> {
    let mut terms: Vec<RankedTerm> = fields
        .iter()
        .flat_map(|&field| {
            reader.terms(field).filter_map(move |term| {
                let frequency = reader.doc_freq(field, term);
                (frequency > 0).then(|| RankedTerm {
                    name: field.to_string(),
                    value: term.to_string(),
                    frequency,
                })
            })
        })
        .collect();

    terms.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.value.cmp(&b.value))
            .then_with(|| a.name.cmp(&b.name))
    });
    terms.truncate(limit);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::index::record::{DATABASE_FIELD, ID_FIELD, IndexRecord, IndexableField};
    use crate::index::{IndexWriter, RamDirectory};
    use std::sync::Arc;

    #[test]
    fn test_most_frequent_first() {
        let directory = RamDirectory::new("terms");
        let mut writer =
            IndexWriter::open(Arc::new(directory.clone()), Arc::new(StandardAnalyzer::new()))
                .unwrap();
        for (id, title, tag) in [
            ("1", "red apple", "fruit"),
            ("2", "green apple", "fruit"),
            ("3", "red car", "vehicle"),
        ] {
            writer
                .add_record(
                    IndexRecord::new()
                        .with_field(IndexableField::keyword(DATABASE_FIELD, "db"))
                        .with_field(IndexableField::keyword(ID_FIELD, id))
                        .with_field(IndexableField::text("title", title))
                        .with_field(IndexableField::keyword("tag", tag)),
                )
                .unwrap();
        }
        writer.delete_by_key("db", "2").unwrap();
        writer.close().unwrap();
        let reader = IndexReader::open(&directory).unwrap();

        let top = top_ranking_terms(&reader, &["title", "tag"], 3);
        let listed: Vec<(&str, u32)> = top.iter().map(|t| (t.value.as_str(), t.frequency)).collect();
        assert_eq!(listed, vec![("red", 2), ("apple", 1), ("car", 1)]);

        assert!(top_ranking_terms(&reader, &["missing"], 5).is_empty());
    }
}
