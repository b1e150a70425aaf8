//! Paginated top-K hit collection.
//!
//! [`HitPageCollector`] scans every match, keeps a bounded min-heap of the
//! best `start + limit` hits and counts the full match set. The page is cut
//! from the top of the heap afterwards.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::error::{QuarryError, Result};
use crate::index::DocNumber;

/// A matching document and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredHit {
    /// Document number inside the snapshot.
    pub doc: DocNumber,
    /// Relevance score.
    pub score: f32,
}

impl ScoredHit {
    /// Create a hit.
    pub fn new(doc: DocNumber, score: f32) -> Self {
        ScoredHit { doc, score }
    }

    /// Rank order: higher score first, then higher doc number.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.doc.cmp(&self.doc))
    }
}

impl Eq for ScoredHit {}

impl PartialOrd for ScoredHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredHit {
    /// Greater means better ranked.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

/// One page of hits plus the size of the whole match set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HitPage {
    /// Hits of the page, best first.
    pub hits: Vec<ScoredHit>,
    /// Number of documents that matched.
    pub total_hits: usize,
}

/// Collects the page `[start, start + limit)` of the ranking, 1-based.
#[derive(Debug)]
pub struct HitPageCollector {
    start: usize,
    limit: usize,
    heap: BinaryHeap<Reverse<ScoredHit>>,
    total_hits: usize,
}

impl HitPageCollector {
    /// Create a collector for a 1-based `start` and a page size.
    pub fn new(start: usize, limit: usize) -> Self {
        HitPageCollector {
            start,
            limit,
            heap: BinaryHeap::with_capacity(start.saturating_add(limit).min(1024)),
            total_hits: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.start.saturating_add(self.limit).saturating_sub(1)
    }

    /// Offer one matching document.
    pub fn collect(&mut self, doc: DocNumber, score: f32) {
        self.total_hits += 1;
        let hit = ScoredHit::new(doc, score);
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }

        if self.heap.len() < capacity {
            self.heap.push(Reverse(hit));
        } else if let Some(Reverse(worst)) = self.heap.peek()
            && hit > *worst
        {
            self.heap.pop();
            self.heap.push(Reverse(hit));
        }
    }

    /// Number of documents offered so far.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// Extract the requested page.
    ///
    /// Fails when `start` is zero. Returns an empty page when fewer than
    /// `start` documents matched.
    pub fn into_page(self) -> Result<HitPage> {
        if self.start == 0 {
            return Err(QuarryError::query("start must be 1 or greater"));
        }
        let mut ranked: Vec<ScoredHit> = self.heap.into_iter().map(|Reverse(hit)| hit).collect();
        ranked.sort_by(|a, b| b.cmp(a));
        let hits = ranked
            .into_iter()
            .skip(self.start - 1)
            .take(self.limit)
            .collect();
        Ok(HitPage {
            hits,
            total_hits: self.total_hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_all(start: usize, limit: usize, hits: &[(DocNumber, f32)]) -> HitPage {
        let mut collector = HitPageCollector::new(start, limit);
        for &(doc, score) in hits {
            collector.collect(doc, score);
        }
        collector.into_page().unwrap()
    }

    #[test]
    fn test_page_from_middle_of_ranking() {
        // doc n scores n, so the ranking is 24, 23, ..., 0
        let hits: Vec<(DocNumber, f32)> = (0..25).map(|n| (n, n as f32)).collect();
        let page = collect_all(11, 5, &hits);

        assert_eq!(page.total_hits, 25);
        let docs: Vec<DocNumber> = page.hits.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![14, 13, 12, 11, 10]);
    }

    #[test]
    fn test_ties_prefer_higher_doc_number() {
        let page = collect_all(1, 3, &[(1, 1.0), (7, 1.0), (3, 1.0), (5, 2.0)]);
        let docs: Vec<DocNumber> = page.hits.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![5, 7, 3]);
    }

    #[test]
    fn test_start_past_end_is_empty() {
        let page = collect_all(10, 5, &[(1, 1.0), (2, 2.0)]);
        assert!(page.hits.is_empty());
        assert_eq!(page.total_hits, 2);
    }

    #[test]
    fn test_zero_start_is_rejected() {
        let mut collector = HitPageCollector::new(0, 5);
        collector.collect(1, 1.0);
        assert!(collector.into_page().is_err());
    }
}
