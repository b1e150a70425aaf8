//! Query execution over one reader.

use crate::error::{QuarryError, Result};
use crate::index::{DocNumber, IndexReader};
use crate::search::collector::{HitPage, HitPageCollector, ScoredHit};
use crate::search::explanation::Explanation;
use crate::search::filter::DocSet;
use crate::search::query::Query;
use crate::search::sort::{SortField, compare_hits};

/// Runs queries against a point-in-time reader.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    reader: &'a IndexReader,
}

impl<'a> Searcher<'a> {
    /// Searcher over `reader`.
    pub fn new(reader: &'a IndexReader) -> Self {
        Searcher { reader }
    }

    /// The underlying reader.
    pub fn reader(&self) -> &'a IndexReader {
        self.reader
    }

    fn matches(&self, query: &Query, filter: Option<&DocSet>) -> Vec<ScoredHit> {
        let mut hits: Vec<ScoredHit> = query
            .score_docs(self.reader)
            .into_iter()
            .filter(|(doc, _)| filter.is_none_or(|set| set.contains(*doc)))
            .map(|(doc, score)| ScoredHit::new(doc, score))
            .collect();
        hits.sort_unstable_by_key(|hit| hit.doc);
        hits
    }

    /// Page `[start, start + limit)` (1-based) of the hits of `query`.
    ///
    /// Without sort fields hits are ranked by score, then by higher doc
    /// number. With sort fields the ranking only breaks ties.
    pub fn search(
        &self,
        query: &Query,
        filter: Option<&DocSet>,
        sort: &[SortField],
        start: usize,
        limit: usize,
    ) -> Result<HitPage> {
        let hits = self.matches(query, filter);

        if sort.is_empty() {
            let mut collector = HitPageCollector::new(start, limit);
            for hit in hits {
                collector.collect(hit.doc, hit.score);
            }
            return collector.into_page();
        }

        if start == 0 {
            return Err(QuarryError::query("start must be 1 or greater"));
        }
        let total_hits = hits.len();
        let mut sorted = hits;
        sorted.sort_by(|a, b| compare_hits(self.reader, sort, a, b));
        Ok(HitPage {
            hits: sorted.into_iter().skip(start - 1).take(limit).collect(),
            total_hits,
        })
    }

    /// Every hit in rank order.
    pub fn search_all(&self, query: &Query, filter: Option<&DocSet>) -> Vec<ScoredHit> {
        let mut hits = self.matches(query, filter);
        hits.sort_by(|a, b| a.rank_cmp(b));
        hits
    }

    /// Number of documents matching the query and filter.
    pub fn count(&self, query: &Query, filter: Option<&DocSet>) -> usize {
        self.matches(query, filter).len()
    }

    /// How `doc` was scored, or why it did not match.
    pub fn explain(&self, query: &Query, doc: DocNumber) -> Explanation {
        query
            .explain(self.reader, doc)
            .unwrap_or_else(|| Explanation::new(0.0, format!("no match for {query} in doc {doc}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::index::record::{IndexRecord, IndexableField};
    use crate::index::{IndexWriter, RamDirectory};
    use crate::policy::FieldType;
    use std::sync::Arc;

    fn reader(n: usize) -> IndexReader {
        let directory = RamDirectory::new("searcher");
        let mut writer =
            IndexWriter::open(Arc::new(directory.clone()), Arc::new(StandardAnalyzer::new()))
                .unwrap();
        for i in 0..n {
            writer
                .add_record(
                    IndexRecord::new()
                        .with_field(IndexableField::text("body", "common"))
                        .with_field(IndexableField::numeric("rank", i as f64)),
                )
                .unwrap();
        }
        writer.close().unwrap();
        IndexReader::open(&directory).unwrap()
    }

    #[test]
    fn test_pagination_counts_everything() {
        let reader = reader(25);
        let searcher = Searcher::new(&reader);
        let query = Query::field_value("rank");

        let page = searcher.search(&query, None, &[], 11, 5).unwrap();
        assert_eq!(page.total_hits, 25);
        let docs: Vec<DocNumber> = page.hits.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![14, 13, 12, 11, 10]);
        assert!(searcher.search(&query, None, &[], 0, 5).is_err());
    }

    #[test]
    fn test_equal_scores_rank_by_doc_number() {
        let reader = reader(4);
        let page = Searcher::new(&reader)
            .search(&Query::term("body", "common"), None, &[], 1, 10)
            .unwrap();
        let docs: Vec<DocNumber> = page.hits.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_filter_and_sort() {
        let reader = reader(6);
        let searcher = Searcher::new(&reader);
        let mut filter = DocSet::empty(reader.max_doc());
        for doc in [1, 4, 5] {
            filter.insert(doc);
        }
        let sort = [SortField::new("rank", true, FieldType::Integer)];

        let page = searcher
            .search(&Query::match_all(), Some(&filter), &sort, 1, 2)
            .unwrap();
        assert_eq!(page.total_hits, 3);
        let docs: Vec<DocNumber> = page.hits.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![1, 4]);
        assert_eq!(searcher.count(&Query::match_all(), Some(&filter)), 3);
    }

    #[test]
    fn test_explain_non_match() {
        let reader = reader(1);
        let explanation = Searcher::new(&reader).explain(&Query::term("body", "missing"), 0);
        assert_eq!(explanation.value, 0.0);
        assert!(explanation.description.starts_with("no match"));
    }
}
