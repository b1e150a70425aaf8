//! Translation of criteria and policies into queries and filters.
//!
//! Keyword searches become one `SHOULD` clause per (policy field, word).
//! Each clause is boosted by the field boost times an order factor that
//! grows for later words, so the last typed words weigh most. Quoted
//! keywords are searched as one phrase.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::analysis::{Analyzer, AnalyzerRegistry};
use crate::config::DEFAULT_MAX_RECENCY_DAYS;
use crate::error::Result;
use crate::index::IndexReader;
use crate::index::record::SCORE_FIELD;
use crate::policy::{QueryField, QueryPolicy};
use crate::search::criteria::QueryCriteria;
use crate::search::filter::{DocSet, Filter, OwnerFilterCache};
use crate::search::query::{Occur, Query};
use crate::search::recency::RecencyBoost;

/// Leading characters fuzzy terms must share with the query term.
pub const FUZZY_PREFIX_LENGTH: usize = 1;

/// How single words are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Exact terms.
    Exact,
    /// Terms within the fuzzy edit distance.
    Fuzzy,
    /// Terms starting with the word.
    Prefix,
}

/// Weight of the word at `position` among `count` words: 1 for the first
/// word, approaching 2 for the last.
pub fn order_factor(position: usize, count: usize) -> f32 {
    if count <= 1 {
        return 1.0;
    }
    1.0 + position as f32 / count as f32
}

/// Builds queries against one reader.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    reader: &'a IndexReader,
    analyzers: &'a AnalyzerRegistry,
    today: Option<NaiveDate>,
    max_recency_days: u32,
    fuzzy_max_edits: u32,
}

impl<'a> QueryBuilder<'a> {
    /// Builder using the analyzers the index was written with.
    pub fn new(reader: &'a IndexReader, analyzers: &'a AnalyzerRegistry) -> Self {
        QueryBuilder {
            reader,
            analyzers,
            today: None,
            max_recency_days: DEFAULT_MAX_RECENCY_DAYS,
            fuzzy_max_edits: 2,
        }
    }

    /// Date recency is measured from; today by default.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Upper bound of recency windows.
    pub fn with_max_recency_days(mut self, days: u32) -> Self {
        self.max_recency_days = days;
        self
    }

    /// Edit distance of fuzzy terms.
    pub fn with_fuzzy_max_edits(mut self, max_edits: u32) -> Self {
        self.fuzzy_max_edits = max_edits;
        self
    }

    fn analyzer_for(&self, field: &str) -> Result<Arc<dyn Analyzer>> {
        let name = self
            .reader
            .field_info(field)
            .and_then(|info| info.analyzer.as_deref());
        self.analyzers.get(name)
    }

    /// Query matching `text` in one field.
    ///
    /// Tokenized fields analyze the text: several terms form a phrase (exact
    /// mode) or a conjunction. Other fields match the text as one term.
    /// Returns `None` when analysis leaves no term.
    pub fn text_query(&self, field: &str, text: &str, mode: MatchMode) -> Result<Option<Query>> {
        if !self.reader.is_tokenized(field) {
            return Ok(Some(self.single_term(field, text, mode)));
        }

        let tokens: Vec<(String, u32)> = self
            .analyzer_for(field)?
            .analyze(text)?
            .map(|token| (token.text, token.position as u32))
            .collect();
        let query = match tokens.as_slice() {
            [] => None,
            [(term, _)] => Some(self.single_term(field, term, mode)),
            [(_, first), ..] if mode == MatchMode::Exact => {
                let first = *first;
                let relative = tokens
                    .iter()
                    .map(|(term, position)| (term.clone(), position - first))
                    .collect();
                Some(Query::phrase(field, relative))
            }
            [init @ .., (last, _)] => {
                let mut conjunction = Query::boolean();
                for (term, _) in init {
                    let word_mode = if mode == MatchMode::Prefix { MatchMode::Exact } else { mode };
                    conjunction.add_clause(Occur::Must, self.single_term(field, term, word_mode));
                }
                conjunction.add_clause(Occur::Must, self.single_term(field, last, mode));
                Some(conjunction)
            }
        };
        Ok(query)
    }

    fn single_term(&self, field: &str, term: &str, mode: MatchMode) -> Query {
        match mode {
            MatchMode::Exact => Query::term(field, term),
            MatchMode::Fuzzy => Query::fuzzy(field, term, self.fuzzy_max_edits, FUZZY_PREFIX_LENGTH),
            MatchMode::Prefix => Query::prefix(field, term),
        }
    }

    fn field_clause(&self, field: &QueryField, text: &str, mode: MatchMode, factor: f32) -> Result<Option<Query>> {
        Ok(self
            .text_query(&field.name, text, mode)?
            .map(|query| query.with_boost(field.effective_boost() * factor)))
    }

    /// Relevance query for keyword criteria.
    ///
    /// `fuzzy` swaps exact terms for fuzzy ones.
    pub fn keyword_query(&self, criteria: &QueryCriteria, policy: &QueryPolicy, fuzzy: bool) -> Result<Query> {
        let keywords = criteria.require_keywords()?;
        let mode = if fuzzy { MatchMode::Fuzzy } else { MatchMode::Exact };
        let mut query = Query::boolean();

        if let Some(phrase) = criteria.phrase() {
            for field in policy.fields() {
                if let Some(clause) = self.field_clause(field, phrase, mode, 1.0)? {
                    query.add_clause(Occur::Should, clause);
                }
            }
            return Ok(query);
        }

        let words = criteria.words();
        let words = if words.is_empty() { vec![keywords.to_string()] } else { words };
        for field in policy.fields() {
            for (position, word) in words.iter().enumerate() {
                let factor = order_factor(position, words.len());
                if let Some(clause) = self.field_clause(field, word, mode, factor)? {
                    query.add_clause(Occur::Should, clause);
                }
            }
        }
        Ok(query)
    }

    /// Full search query: score-only or keyword relevance, with recency.
    pub fn build(&self, criteria: &QueryCriteria, policy: &QueryPolicy, fuzzy: bool) -> Result<Query> {
        let query = if criteria.is_score_only() {
            Query::field_value(SCORE_FIELD)
        } else {
            self.keyword_query(criteria, policy, fuzzy)?
        };

        Ok(match criteria.recency() {
            Some(recency) => {
                let today = self.today.unwrap_or_else(|| Local::now().date_naive());
                query.with_recency(RecencyBoost::new(
                    today,
                    recency.max_days,
                    recency.multiplier,
                    self.max_recency_days,
                ))
            }
            None => query,
        })
    }

    /// Autocomplete query: every word must match some policy field; the last
    /// word matches as a prefix (or fuzzily).
    pub fn lookup_query(&self, criteria: &QueryCriteria, policy: &QueryPolicy, fuzzy: bool) -> Result<Query> {
        let keywords = criteria.require_keywords()?;
        let words = match criteria.phrase() {
            Some(phrase) => vec![phrase.to_string()],
            None => {
                let words = criteria.words();
                if words.is_empty() { vec![keywords.to_string()] } else { words }
            }
        };

        let mut query = Query::boolean();
        for (position, word) in words.iter().enumerate() {
            let last = position + 1 == words.len();
            let mode = match (fuzzy, last) {
                (true, _) => MatchMode::Fuzzy,
                (false, true) => MatchMode::Prefix,
                (false, false) => MatchMode::Exact,
            };
            let factor = order_factor(position, words.len());
            let mut any_field = Query::boolean();
            for field in policy.fields() {
                if let Some(clause) = self.field_clause(field, word, mode, factor)? {
                    any_field.add_clause(Occur::Should, clause);
                }
            }
            if !any_field.is_empty() {
                query.add_clause(Occur::Must, any_field);
            }
        }
        Ok(query)
    }

    /// Documents allowed by the non-scoring parts of the criteria, or `None`
    /// when nothing is filtered.
    pub fn filter(&self, criteria: &QueryCriteria, owners: &OwnerFilterCache) -> Result<Option<DocSet>> {
        let mut filters = Vec::new();
        if let Some((from, to)) = criteria.index_date_range() {
            filters.push(Filter::IndexDateRange { from, to });
        }
        if let Some((latitude, longitude, radius_km)) = criteria.geo().radius() {
            filters.push(Filter::GeoRadius {
                latitude,
                longitude,
                radius_km,
            });
        }
        for (field, value) in criteria.geo().locations() {
            let terms = if self.reader.is_tokenized(field) {
                self.analyzer_for(field)?.terms(value)?
            } else {
                vec![value.to_string()]
            };
            filters.push(Filter::AllTerms {
                field: field.to_string(),
                terms,
            });
        }

        let mut set = criteria
            .has_owner_filter()
            .then(|| DocSet::clone(&owners.get(self.reader, criteria.owner())));
        for filter in filters {
            let docs = filter.doc_set(self.reader);
            match set.as_mut() {
                Some(current) => current.intersect_with(&docs),
                None => set = Some(docs),
            }
        }
        Ok(set)
    }
}
