//! Query construction and execution.
//!
//! ```text
//! options ─► QueryCriteria ─► QueryBuilder ─► Query + DocSet filter
//!                                                  │
//!                         IndexReader ◄── Searcher ┘
//!                                            │
//!                      HitPageCollector ─► HitPage ─► QueryExecutor ─► SearchResults
//! ```
//!
//! Relevance uses BM25 per term, summed over boolean clauses, optionally
//! multiplied by a recency factor. Filters (owner, index date, geo radius,
//! exact locations) never change scores.

pub mod builder;
pub mod collector;
pub mod criteria;
pub mod executor;
pub mod explanation;
pub mod filter;
pub mod more_like_this;
pub mod query;
pub mod recency;
pub mod scorer;
pub mod searcher;
pub mod sort;
pub mod terms;

pub use builder::{MatchMode, QueryBuilder};
pub use collector::{HitPage, HitPageCollector, ScoredHit};
pub use criteria::{GeoCriteria, QueryCriteria, QueryCriteriaBuilder, Recency};
pub use executor::{ExplainedHit, QueryExecutor, SearchResults};
pub use explanation::Explanation;
pub use filter::{DocSet, Filter, OwnerFilterCache};
pub use more_like_this::{InterestingTerm, MoreLikeThis, SimilarTo};
pub use query::{BooleanClause, Occur, Query};
pub use recency::RecencyBoost;
pub use scorer::BM25Scorer;
pub use searcher::Searcher;
pub use sort::SortField;
pub use terms::{RankedTerm, top_ranking_terms};
