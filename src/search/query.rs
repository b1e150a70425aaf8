//! Query tree and its evaluation against an [`IndexReader`].
//!
//! Every query computes a score per matching live document and can explain
//! the score of a single document. Term based queries score with BM25;
//! prefix and fuzzy queries expand to the best matching index terms first.

use std::collections::HashMap;
use std::fmt;

use crate::index::snapshot::Posting;
use crate::index::{DocNumber, IndexReader};
use crate::search::explanation::Explanation;
use crate::search::recency::RecencyBoost;
use crate::search::scorer::BM25Scorer;
use crate::util::levenshtein::{common_prefix_chars, edit_distance_within};

/// Scores of matching documents.
pub type Scores = HashMap<DocNumber, f32>;

/// Most index terms a prefix query expands to.
pub const MAX_PREFIX_EXPANSIONS: usize = 128;

/// Most index terms a fuzzy query expands to.
pub const MAX_FUZZY_EXPANSIONS: usize = 50;

/// How a boolean clause takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// Required; contributes to the score.
    Must,
    /// Optional; contributes to the score. At least one is required when
    /// there is no `Must` clause.
    Should,
    /// Excluded; never scores.
    MustNot,
}

/// One clause of a boolean query.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    /// Role of the clause.
    pub occur: Occur,
    /// The sub-query.
    pub query: Query,
}

/// Search query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Exact term in a field.
    Term {
        field: String,
        term: String,
        boost: f32,
    },
    /// Terms at fixed relative positions.
    Phrase {
        field: String,
        /// Terms with their position relative to the first one.
        terms: Vec<(String, u32)>,
        boost: f32,
    },
    /// Terms starting with a prefix.
    Prefix {
        field: String,
        prefix: String,
        boost: f32,
    },
    /// Terms within an edit distance.
    Fuzzy {
        field: String,
        term: String,
        max_edits: u32,
        /// Leading characters that must match exactly.
        prefix_length: usize,
        boost: f32,
    },
    /// Combination of clauses.
    Boolean {
        clauses: Vec<BooleanClause>,
        boost: f32,
    },
    /// Every live document, scored by a numeric doc value (0 when missing).
    FieldValue { field: String, boost: f32 },
    /// Every live document with a constant score.
    MatchAll { boost: f32 },
    /// Wrapped query with its scores multiplied by a recency factor.
    Recency {
        query: Box<Query>,
        recency: RecencyBoost,
    },
}

impl Query {
    /// Term query with boost 1.
    pub fn term<F: Into<String>, T: Into<String>>(field: F, term: T) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
            boost: 1.0,
        }
    }

    /// Phrase query over terms with relative positions.
    pub fn phrase<F: Into<String>>(field: F, terms: Vec<(String, u32)>) -> Self {
        Query::Phrase {
            field: field.into(),
            terms,
            boost: 1.0,
        }
    }

    /// Prefix query with boost 1.
    pub fn prefix<F: Into<String>, P: Into<String>>(field: F, prefix: P) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
            boost: 1.0,
        }
    }

    /// Fuzzy query with boost 1.
    pub fn fuzzy<F: Into<String>, T: Into<String>>(
        field: F,
        term: T,
        max_edits: u32,
        prefix_length: usize,
    ) -> Self {
        Query::Fuzzy {
            field: field.into(),
            term: term.into(),
            max_edits,
            prefix_length,
            boost: 1.0,
        }
    }

    /// Empty boolean query.
    pub fn boolean() -> Self {
        Query::Boolean {
            clauses: Vec::new(),
            boost: 1.0,
        }
    }

    /// Score by a doc value.
    pub fn field_value<F: Into<String>>(field: F) -> Self {
        Query::FieldValue {
            field: field.into(),
            boost: 1.0,
        }
    }

    /// Match every live document.
    pub fn match_all() -> Self {
        Query::MatchAll { boost: 1.0 }
    }

    /// Wrap in a recency boost.
    pub fn with_recency(self, recency: RecencyBoost) -> Self {
        Query::Recency {
            query: Box::new(self),
            recency,
        }
    }

    /// Add a clause; does nothing on non-boolean queries.
    pub fn add_clause(&mut self, occur: Occur, query: Query) {
        if let Query::Boolean { clauses, .. } = self {
            clauses.push(BooleanClause { occur, query });
        }
    }

    /// Builder-style [`add_clause`](Self::add_clause).
    pub fn with_clause(mut self, occur: Occur, query: Query) -> Self {
        self.add_clause(occur, query);
        self
    }

    /// Clauses of a boolean query.
    pub fn clauses(&self) -> &[BooleanClause] {
        match self {
            Query::Boolean { clauses, .. } => clauses,
            _ => &[],
        }
    }

    /// Whether the query can never match.
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Boolean { clauses, .. } => clauses.iter().all(|c| c.occur == Occur::MustNot),
            Query::Phrase { terms, .. } => terms.is_empty(),
            Query::Recency { query, .. } => query.is_empty(),
            _ => false,
        }
    }

    /// Boost of the query.
    pub fn boost(&self) -> f32 {
        match self {
            Query::Term { boost, .. }
            | Query::Phrase { boost, .. }
            | Query::Prefix { boost, .. }
            | Query::Fuzzy { boost, .. }
            | Query::Boolean { boost, .. }
            | Query::FieldValue { boost, .. }
            | Query::MatchAll { boost } => *boost,
            Query::Recency { query, .. } => query.boost(),
        }
    }

    /// Replace the boost; non-positive values count as 1.
    pub fn with_boost(mut self, value: f32) -> Self {
        let value = if value > 0.0 { value } else { 1.0 };
        match &mut self {
            Query::Term { boost, .. }
            | Query::Phrase { boost, .. }
            | Query::Prefix { boost, .. }
            | Query::Fuzzy { boost, .. }
            | Query::Boolean { boost, .. }
            | Query::FieldValue { boost, .. }
            | Query::MatchAll { boost } => *boost = value,
            Query::Recency { query, .. } => {
                let inner = std::mem::replace(query.as_mut(), Query::match_all());
                **query = inner.with_boost(value);
            }
        }
        self
    }

    /// Scores of every matching live document.
    pub fn score_docs(&self, reader: &IndexReader) -> Scores {
        match self {
            Query::Term { field, term, boost } => {
                let scorer = BM25Scorer::new(reader, field, term, *boost);
                live_postings(reader, field, term)
                    .map(|p| (p.doc, scorer.score(reader, p.doc, p.freq())))
                    .collect()
            }
            Query::Phrase { field, terms, boost } => {
                let scorers = phrase_scorers(reader, field, terms, *boost);
                phrase_frequencies(reader, field, terms)
                    .into_iter()
                    .map(|(doc, freq)| {
                        let score = scorers.iter().map(|s| s.score(reader, doc, freq)).sum();
                        (doc, score)
                    })
                    .collect()
            }
            Query::Prefix { .. } | Query::Fuzzy { .. } => {
                let field = self.field().unwrap_or_default();
                let mut scores = Scores::new();
                for (term, weight) in self.expand(reader) {
                    let scorer = BM25Scorer::new(reader, field, &term, self.boost() * weight);
                    for posting in live_postings(reader, field, &term) {
                        let score = scorer.score(reader, posting.doc, posting.freq());
                        let best = scores.entry(posting.doc).or_insert(score);
                        *best = best.max(score);
                    }
                }
                scores
            }
            Query::Boolean { clauses, boost } => score_boolean(reader, clauses, *boost),
            Query::FieldValue { field, boost } => reader
                .live_docs()
                .map(|doc| (doc, *boost * reader.doc_value(doc, field).unwrap_or(0.0) as f32))
                .collect(),
            Query::MatchAll { boost } => reader.live_docs().map(|doc| (doc, *boost)).collect(),
            Query::Recency { query, recency } => {
                let mut scores = query.score_docs(reader);
                for (doc, score) in scores.iter_mut() {
                    *score *= recency.factor(reader, *doc);
                }
                scores
            }
        }
    }

    /// Explanation of one document's score, or `None` when it does not match.
    pub fn explain(&self, reader: &IndexReader, doc: DocNumber) -> Option<Explanation> {
        if reader.is_deleted(doc) {
            return None;
        }
        match self {
            Query::Term { field, term, boost } => {
                let posting = find_posting(reader, field, term, doc)?;
                Some(BM25Scorer::new(reader, field, term, *boost).explain(reader, doc, posting.freq()))
            }
            Query::Phrase { field, terms, boost } => {
                let freq = phrase_frequencies(reader, field, terms).remove(&doc)?;
                let details: Vec<Explanation> = phrase_scorers(reader, field, terms, *boost)
                    .iter()
                    .map(|s| s.explain(reader, doc, freq))
                    .collect();
                let total = details.iter().map(|d| d.value).sum();
                Some(
                    Explanation::new(total, format!("phrase {self}, freq={freq}, sum of:"))
                        .with_details(details),
                )
            }
            Query::Prefix { .. } | Query::Fuzzy { .. } => {
                let field = self.field().unwrap_or_default();
                self.expand(reader)
                    .into_iter()
                    .filter_map(|(term, weight)| {
                        let posting = find_posting(reader, field, &term, doc)?;
                        let scorer = BM25Scorer::new(reader, field, &term, self.boost() * weight);
                        Some(scorer.explain(reader, doc, posting.freq()))
                    })
                    .max_by(|a, b| a.value.total_cmp(&b.value))
                    .map(|best| {
                        Explanation::new(best.value, format!("{self}, max of:")).with_detail(best)
                    })
            }
            Query::Boolean { clauses, boost } => explain_boolean(reader, clauses, *boost, doc),
            Query::FieldValue { field, boost } => {
                let value = reader.doc_value(doc, field).unwrap_or(0.0) as f32;
                Some(
                    Explanation::new(*boost * value, format!("field value of {field}, product of:"))
                        .with_details([
                            Explanation::new(value, format!("{field}={value}")),
                            Explanation::new(*boost, "boost"),
                        ]),
                )
            }
            Query::MatchAll { boost } => Some(Explanation::new(*boost, "match all")),
            Query::Recency { query, recency } => {
                let inner = query.explain(reader, doc)?;
                let factor = recency.factor(reader, doc);
                let age = recency
                    .age_of(reader, doc)
                    .map(|age| format!("age {age} days"))
                    .unwrap_or_else(|| "no index date".to_string());
                Some(
                    Explanation::new(inner.value * factor, "recency boosted, product of:")
                        .with_detail(inner)
                        .with_detail(Explanation::new(
                            factor,
                            format!(
                                "recency factor, {age}, window {} days, multiplier {}",
                                recency.max_days(),
                                recency.multiplier()
                            ),
                        )),
                )
            }
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            Query::Term { field, .. }
            | Query::Phrase { field, .. }
            | Query::Prefix { field, .. }
            | Query::Fuzzy { field, .. }
            | Query::FieldValue { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Index terms a prefix or fuzzy query stands for, with their weights.
    pub fn expand(&self, reader: &IndexReader) -> Vec<(String, f32)> {
        match self {
            Query::Prefix { field, prefix, .. } => {
                let mut terms: Vec<(&str, u32)> = reader
                    .terms_with_prefix(field, prefix)
                    .into_iter()
                    .map(|term| (term, reader.doc_freq(field, term)))
                    .filter(|(_, df)| *df > 0)
                    .collect();
                terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                terms
                    .into_iter()
                    .take(MAX_PREFIX_EXPANSIONS)
                    .map(|(term, _)| (term.to_string(), 1.0))
                    .collect()
            }
            Query::Fuzzy {
                field,
                term,
                max_edits,
                prefix_length,
                ..
            } => {
                let prefix: String = term.chars().take(*prefix_length).collect();
                let query_len = term.chars().count();
                let mut candidates: Vec<(&str, usize, u32)> = reader
                    .terms_with_prefix(field, &prefix)
                    .into_iter()
                    .filter(|candidate| common_prefix_chars(candidate, term) >= prefix.chars().count())
                    .filter_map(|candidate| {
                        let distance = edit_distance_within(candidate, term, *max_edits as usize)?;
                        let df = reader.doc_freq(field, candidate);
                        (df > 0).then_some((candidate, distance, df))
                    })
                    .collect();
                candidates.sort_by(|a, b| {
                    a.1.cmp(&b.1)
                        .then_with(|| b.2.cmp(&a.2))
                        .then_with(|| a.0.cmp(b.0))
                });
                candidates
                    .into_iter()
                    .take(MAX_FUZZY_EXPANSIONS)
                    .map(|(candidate, distance, _)| {
                        let longest = query_len.max(candidate.chars().count()).max(1);
                        (candidate.to_string(), 1.0 - distance as f32 / longest as f32)
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

fn live_postings<'a>(
    reader: &'a IndexReader,
    field: &str,
    term: &str,
) -> impl Iterator<Item = &'a Posting> {
    reader
        .postings(field, term)
        .iter()
        .filter(move |p| !reader.is_deleted(p.doc))
}

fn find_posting<'a>(
    reader: &'a IndexReader,
    field: &str,
    term: &str,
    doc: DocNumber,
) -> Option<&'a Posting> {
    reader.postings(field, term).iter().find(|p| p.doc == doc)
}

fn phrase_scorers(
    reader: &IndexReader,
    field: &str,
    terms: &[(String, u32)],
    boost: f32,
) -> Vec<BM25Scorer> {
    terms
        .iter()
        .map(|(term, _)| BM25Scorer::new(reader, field, term, boost))
        .collect()
}

/// Documents containing the phrase, with the number of occurrences.
fn phrase_frequencies(
    reader: &IndexReader,
    field: &str,
    terms: &[(String, u32)],
) -> HashMap<DocNumber, u32> {
    let mut found = HashMap::new();
    let Some(((first, first_offset), rest)) = terms.split_first() else {
        return found;
    };
    let rest_postings: Vec<(&[Posting], u32)> = rest
        .iter()
        .map(|(term, offset)| (reader.postings(field, term), offset - first_offset))
        .collect();

    for posting in live_postings(reader, field, first) {
        let others: Option<Vec<(&Posting, u32)>> = rest_postings
            .iter()
            .map(|(postings, delta)| {
                postings
                    .iter()
                    .find(|p| p.doc == posting.doc)
                    .map(|p| (p, *delta))
            })
            .collect();
        let Some(others) = others else {
            continue;
        };
        let freq = posting
            .positions
            .iter()
            .filter(|&&start| {
                others
                    .iter()
                    .all(|(p, delta)| p.positions.contains(&(start + delta)))
            })
            .count() as u32;
        if freq > 0 {
            found.insert(posting.doc, freq);
        }
    }
    found
}

fn score_boolean(reader: &IndexReader, clauses: &[BooleanClause], boost: f32) -> Scores {
    let mut required: Option<Scores> = None;
    let mut optional: Vec<Scores> = Vec::new();
    let mut excluded: Vec<Scores> = Vec::new();

    for clause in clauses {
        let scores = clause.query.score_docs(reader);
        match clause.occur {
            Occur::Must => {
                required = Some(match required {
                    None => scores,
                    Some(mut acc) => {
                        acc.retain(|doc, _| scores.contains_key(doc));
                        for (doc, score) in acc.iter_mut() {
                            *score += scores[doc];
                        }
                        acc
                    }
                });
            }
            Occur::Should => optional.push(scores),
            Occur::MustNot => excluded.push(scores),
        }
    }

    let mut result = match required {
        Some(mut acc) => {
            for scores in &optional {
                for (doc, score) in acc.iter_mut() {
                    if let Some(extra) = scores.get(doc) {
                        *score += extra;
                    }
                }
            }
            acc
        }
        None => {
            let mut acc = Scores::new();
            for scores in optional {
                for (doc, score) in scores {
                    *acc.entry(doc).or_insert(0.0) += score;
                }
            }
            acc
        }
    };

    result.retain(|doc, _| !excluded.iter().any(|scores| scores.contains_key(doc)));
    for score in result.values_mut() {
        *score *= boost;
    }
    result
}

fn explain_boolean(
    reader: &IndexReader,
    clauses: &[BooleanClause],
    boost: f32,
    doc: DocNumber,
) -> Option<Explanation> {
    let mut details = Vec::new();
    for clause in clauses {
        match (clause.occur, clause.query.explain(reader, doc)) {
            (Occur::Must, Some(e)) | (Occur::Should, Some(e)) => details.push(e),
            (Occur::Must, None) | (Occur::MustNot, Some(_)) => return None,
            (Occur::Should, None) | (Occur::MustNot, None) => {}
        }
    }
    if details.is_empty() {
        return None;
    }

    let sum: f32 = details.iter().map(|d| d.value).sum();
    let summed = Explanation::new(sum, "sum of:").with_details(details);
    if (boost - 1.0).abs() > f32::EPSILON {
        Some(
            Explanation::new(sum * boost, "product of:")
                .with_detail(summed)
                .with_detail(Explanation::new(boost, "boost")),
        )
    } else {
        Some(summed)
    }
}

fn write_boost(f: &mut fmt::Formatter<'_>, boost: f32) -> fmt::Result {
    if (boost - 1.0).abs() > f32::EPSILON {
        write!(f, "^{boost}")?;
    }
    Ok(())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, term, boost } => {
                write!(f, "{field}:{term}")?;
                write_boost(f, *boost)
            }
            Query::Phrase { field, terms, boost } => {
                let words: Vec<&str> = terms.iter().map(|(t, _)| t.as_str()).collect();
                write!(f, "{field}:\"{}\"", words.join(" "))?;
                write_boost(f, *boost)
            }
            Query::Prefix { field, prefix, boost } => {
                write!(f, "{field}:{prefix}*")?;
                write_boost(f, *boost)
            }
            Query::Fuzzy {
                field,
                term,
                max_edits,
                boost,
                ..
            } => {
                write!(f, "{field}:{term}~{max_edits}")?;
                write_boost(f, *boost)
            }
            Query::Boolean { clauses, boost } => {
                write!(f, "(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match clause.occur {
                        Occur::Must => write!(f, "+")?,
                        Occur::MustNot => write!(f, "-")?,
                        Occur::Should => {}
                    }
                    write!(f, "{}", clause.query)?;
                }
                write!(f, ")")?;
                write_boost(f, *boost)
            }
            Query::FieldValue { field, boost } => {
                write!(f, "value({field})")?;
                write_boost(f, *boost)
            }
            Query::MatchAll { boost } => {
                write!(f, "*:*")?;
                write_boost(f, *boost)
            }
            Query::Recency { query, recency } => {
                write!(f, "recency({query}, {} days)", recency.max_days())
            }
        }
    }
}
