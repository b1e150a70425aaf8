//! Query execution against opened indexes.
//!
//! The [`QueryExecutor`] owns everything a search needs besides the index
//! itself: analyzers, limits, and the owner filter cache. Readers are passed
//! in per call, so one executor serves every index.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::analysis::AnalyzerRegistry;
use crate::config::QuarryConfig;
use crate::document::{AttributeValue, Attributes, Document, SearchDoc};
use crate::error::{QuarryError, Result};
use crate::index::IndexReader;
use crate::index::record::{DATABASE_FIELD, ID_FIELD};
use crate::policy::{LookupPolicy, QueryPolicy};
use crate::search::builder::QueryBuilder;
use crate::search::collector::ScoredHit;
use crate::search::criteria::QueryCriteria;
use crate::search::explanation::Explanation;
use crate::search::filter::{DocSet, Filter, OwnerFilterCache};
use crate::search::more_like_this::{MoreLikeThis, SimilarTo};
use crate::search::query::Query;
use crate::search::searcher::Searcher;
use crate::search::sort::sort_fields;
use crate::search::terms::{RankedTerm, top_ranking_terms};
use crate::spelling::Suggestion;

/// Suggestions offered per unknown word.
const SUGGESTIONS_PER_WORD: usize = 3;

/// One page of search hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Hits of the requested page.
    pub hits: Vec<SearchDoc>,
    /// Number of matching documents, all pages included.
    pub total_hits: usize,
    /// Highest score on the page.
    pub max_score: f32,
    /// Spelling suggestions for keyword words missing from the index.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
}

/// A hit together with how it was scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainedHit {
    pub hit: SearchDoc,
    pub explanation: Explanation,
}

/// Executes criteria against index readers.
#[derive(Debug)]
pub struct QueryExecutor {
    analyzers: Arc<AnalyzerRegistry>,
    max_recency_days: u32,
    fuzzy_max_edits: u32,
    default_limit: usize,
    today: Option<NaiveDate>,
    owners: OwnerFilterCache,
}

impl QueryExecutor {
    /// Executor with default limits.
    pub fn new(analyzers: Arc<AnalyzerRegistry>) -> Self {
        Self::from_config(&QuarryConfig::default(), analyzers)
    }

    /// Executor with the limits of `config`.
    pub fn from_config(config: &QuarryConfig, analyzers: Arc<AnalyzerRegistry>) -> Self {
        QueryExecutor {
            analyzers,
            max_recency_days: config.max_recency_days,
            fuzzy_max_edits: config.fuzzy_max_edits,
            default_limit: config.default_limit.max(1),
            today: None,
            owners: OwnerFilterCache::new(),
        }
    }

    /// Measure recency from a fixed date instead of today.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Drop cached owner filters.
    pub fn clear_filters(&self) {
        self.owners.clear();
    }

    fn builder<'a>(&'a self, reader: &'a IndexReader) -> QueryBuilder<'a> {
        let builder = QueryBuilder::new(reader, &self.analyzers)
            .with_max_recency_days(self.max_recency_days)
            .with_fuzzy_max_edits(self.fuzzy_max_edits);
        match self.today {
            Some(today) => builder.with_today(today),
            None => builder,
        }
    }

    fn page_limit(&self, limit: usize) -> usize {
        if limit == 0 { self.default_limit } else { limit }
    }

    /// Page `start` (1-based) of the hits for `criteria`.
    ///
    /// Fuzzy criteria retry with fuzzy terms when the exact query finds
    /// nothing. Every failure is reported as a search error.
    pub fn search(
        &self,
        reader: &IndexReader,
        criteria: &QueryCriteria,
        policy: &QueryPolicy,
        include_suggestions: bool,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        self.run_search(reader, criteria, policy, include_suggestions, start, limit)
            .map_err(QuarryError::into_search_error)
    }

    fn run_search(
        &self,
        reader: &IndexReader,
        criteria: &QueryCriteria,
        policy: &QueryPolicy,
        include_suggestions: bool,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        let limit = self.page_limit(limit);
        let builder = self.builder(reader);
        let filter = builder.filter(criteria, &self.owners)?;
        let sort = sort_fields(criteria.sort(), policy);
        let searcher = Searcher::new(reader);

        let query = builder.build(criteria, policy, false)?;
        let mut page = searcher.search(&query, filter.as_ref(), &sort, start, limit)?;
        if page.total_hits == 0 && criteria.is_fuzzy() && !criteria.is_score_only() {
            debug!("no hits for {query} in {}, retrying with fuzzy terms", reader.location());
            let fuzzy = builder.build(criteria, policy, true)?;
            page = searcher.search(&fuzzy, filter.as_ref(), &sort, start, limit)?;
        }

        let suggestions = if include_suggestions {
            suggestions(reader, criteria, self.fuzzy_max_edits as usize)
        } else {
            Vec::new()
        };
        let hits = to_search_docs(reader, &page.hits);
        Ok(SearchResults {
            max_score: hits.iter().map(|h| h.score).fold(0.0, f32::max),
            hits,
            total_hits: page.total_hits,
            suggestions,
        })
    }

    /// Distinct values of the lookup's return field over the best matches,
    /// at most `limit` of them.
    pub fn partial_lookup(
        &self,
        reader: &IndexReader,
        criteria: &QueryCriteria,
        lookup: &LookupPolicy,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.run_lookup(reader, criteria, lookup, limit)
            .map_err(QuarryError::into_search_error)
    }

    fn run_lookup(
        &self,
        reader: &IndexReader,
        criteria: &QueryCriteria,
        lookup: &LookupPolicy,
        limit: usize,
    ) -> Result<Vec<String>> {
        let limit = self.page_limit(limit);
        let builder = self.builder(reader);
        let filter = builder.filter(criteria, &self.owners)?;
        let searcher = Searcher::new(reader);

        let query = builder.lookup_query(criteria, lookup, false)?;
        let mut values = distinct_values(
            reader,
            &searcher.search_all(&query, filter.as_ref()),
            &lookup.field_to_return,
            limit,
        );
        if values.is_empty() && criteria.is_fuzzy() {
            debug!("no lookup values for {query}, retrying with fuzzy terms");
            let fuzzy = builder.lookup_query(criteria, lookup, true)?;
            values = distinct_values(
                reader,
                &searcher.search_all(&fuzzy, filter.as_ref()),
                &lookup.field_to_return,
                limit,
            );
        }
        Ok(values)
    }

    /// Documents similar to `source` over the policy fields. The source
    /// itself is never returned.
    pub fn more_like_this(
        &self,
        reader: &IndexReader,
        source: &SimilarTo,
        policy: &QueryPolicy,
        start: usize,
        limit: usize,
    ) -> Result<SearchResults> {
        let run = || -> Result<SearchResults> {
            let doc = source.resolve(reader)?;
            let fields: Vec<&str> = policy.fields().iter().map(|f| f.name.as_str()).collect();
            let query = MoreLikeThis::new().query(reader, &self.analyzers, doc, &fields)?;
            debug!("more like {source:?}: {query}");

            let others = Filter::Exclude(doc).doc_set(reader);
            let page = Searcher::new(reader).search(&query, Some(&others), &[], start, self.page_limit(limit))?;
            let hits = to_search_docs(reader, &page.hits);
            Ok(SearchResults {
                max_score: hits.iter().map(|h| h.score).fold(0.0, f32::max),
                hits,
                total_hits: page.total_hits,
                suggestions: Vec::new(),
            })
        };
        run().map_err(QuarryError::into_search_error)
    }

    /// Page of hits with the scoring explanation of each.
    pub fn explain_search(
        &self,
        reader: &IndexReader,
        criteria: &QueryCriteria,
        policy: &QueryPolicy,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ExplainedHit>> {
        let run = || -> Result<Vec<ExplainedHit>> {
            let builder = self.builder(reader);
            let filter = builder.filter(criteria, &self.owners)?;
            let query = builder.build(criteria, policy, false)?;
            let searcher = Searcher::new(reader);
            let sort = sort_fields(criteria.sort(), policy);
            let page = searcher.search(&query, filter.as_ref(), &sort, start, self.page_limit(limit))?;

            Ok(to_search_docs(reader, &page.hits)
                .into_iter()
                .map(|hit| ExplainedHit {
                    explanation: searcher.explain(&query, hit.doc_number),
                    hit,
                })
                .collect())
        };
        run().map_err(QuarryError::into_search_error)
    }

    /// Why `doc` scored the way it did for `query`.
    pub fn explain(&self, reader: &IndexReader, query: &Query, doc: u32) -> Explanation {
        Searcher::new(reader).explain(query, doc)
    }

    /// Most frequent terms of `fields`, or of every policy field when
    /// `fields` is empty.
    pub fn top_ranking_terms(
        &self,
        reader: &IndexReader,
        policy: &QueryPolicy,
        fields: &[String],
        limit: usize,
    ) -> Vec<RankedTerm> {
        let fields: Vec<&str> = if fields.is_empty() {
            policy.fields().iter().map(|f| f.name.as_str()).collect()
        } else {
            fields.iter().map(String::as_str).collect()
        };
        top_ranking_terms(reader, &fields, self.page_limit(limit))
    }

    /// Documents passing the criteria filters; all live documents when the
    /// criteria filter nothing.
    pub fn filtered_docs(&self, reader: &IndexReader, criteria: &QueryCriteria) -> Result<DocSet> {
        Ok(self
            .builder(reader)
            .filter(criteria, &self.owners)?
            .unwrap_or_else(|| DocSet::live(reader)))
    }
}

/// Rebuild hits into documents, dropping repeated identities.
fn to_search_docs(reader: &IndexReader, hits: &[ScoredHit]) -> Vec<SearchDoc> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter_map(|hit| {
            let doc = stored_document(reader, hit.doc);
            let key = (doc.database().to_string(), doc.id().map(str::to_string));
            if key.1.is_some() && !seen.insert(key) {
                debug!("skipping repeated hit {:?} in {}", doc.id(), reader.location());
                return None;
            }
            Some(SearchDoc {
                document: doc,
                score: hit.score,
                doc_number: hit.doc,
            })
        })
        .collect()
}

fn stored_document(reader: &IndexReader, doc: u32) -> Document {
    let mut database = String::new();
    let mut id = None;
    let mut values: Vec<(&str, Vec<&str>)> = Vec::new();
    for (name, value) in reader.stored_fields(doc) {
        match name.as_str() {
            DATABASE_FIELD => database = value.clone(),
            ID_FIELD => id = Some(value.clone()),
            _ => match values.iter_mut().find(|(n, _)| *n == name.as_str()) {
                Some((_, repeated)) => repeated.push(value.as_str()),
                None => values.push((name.as_str(), vec![value.as_str()])),
            },
        }
    }

    let mut attributes = Attributes::new();
    for (name, mut repeated) in values {
        let value = if repeated.len() == 1 {
            AttributeValue::from(repeated.remove(0))
        } else {
            AttributeValue::List(repeated.into_iter().map(AttributeValue::from).collect())
        };
        attributes.insert(name, value);
    }
    Document::from_stored(database, id, attributes)
}

fn distinct_values(reader: &IndexReader, hits: &[ScoredHit], field: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    'hits: for hit in hits {
        for (name, value) in reader.stored_fields(hit.doc) {
            if name != field || !seen.insert(value.as_str()) {
                continue;
            }
            values.push(value.clone());
            if values.len() >= limit {
                break 'hits;
            }
        }
    }
    values
}

/// Suggestions for keyword words the index dictionary does not know.
fn suggestions(reader: &IndexReader, criteria: &QueryCriteria, max_edits: usize) -> Vec<Suggestion> {
    let dictionary = reader.dictionary();
    if dictionary.is_empty() {
        return Vec::new();
    }
    criteria
        .words()
        .iter()
        .filter(|word| word.chars().count() > 1 && !dictionary.contains(word))
        .flat_map(|word| dictionary.suggest(word, max_edits, SUGGESTIONS_PER_WORD))
        .collect()
}
