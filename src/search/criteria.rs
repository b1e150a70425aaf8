//! Search criteria.
//!
//! [`QueryCriteria`] is an immutable set of search options built with
//! [`QueryCriteriaBuilder`] or parsed from string options. Keywords are
//! sanitized on the way in: synonyms are substituted, disallowed characters
//! are dropped and the text is lower-cased.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{QuarryError, Result};
use crate::index::record::{ALL_OWNER, INDEX_DATE_FORMAT, SORT_FIELD};

/// Option keys understood by [`QueryCriteria::from_options`].
pub mod keys {
    pub const KEYWORDS: &str = "keywords";
    pub const OWNER: &str = "owner";
    pub const RECENCY_MAX_DAYS: &str = "recencyMaxDays";
    pub const RECENCY_MULTIPLIER: &str = "recencyMultiplier";
    pub const INDEX_DATE_FROM: &str = "indexDateFrom";
    pub const INDEX_DATE_TO: &str = "indexDateTo";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const RADIUS: &str = "radius";
    pub const ZIP: &str = "zip";
    pub const CITY: &str = "city";
    pub const STATE: &str = "state";
    pub const COUNTRY: &str = "country";
    pub const REGION: &str = "region";
    pub const SORT_FIELD: &str = "sortField";
    pub const SORT_ASCENDING: &str = "sortAscending";
    pub const SCORE_QUERY: &str = "scoreQuery";
    pub const FUZZY: &str = "fuzzy";
}

/// Location fields matched exactly against index fields of the same name.
pub const LOCATION_FIELDS: &[&str] = &[keys::ZIP, keys::CITY, keys::STATE, keys::COUNTRY, keys::REGION];

/// Apply synonyms, drop disallowed characters, lower-case and collapse
/// whitespace.
///
/// Letters, digits, whitespace, `"`, `'`, `-` and `_` are kept.
pub fn sanitize_keywords(raw: &str, synonyms: &HashMap<String, String>) -> String {
    let mut text = raw.to_lowercase();

    let mut symbolic: Vec<(&String, &String)> = synonyms
        .iter()
        .filter(|(from, _)| !from.is_empty() && !from.chars().any(char::is_alphanumeric))
        .collect();
    symbolic.sort();
    for (from, to) in symbolic {
        text = text.replace(from.as_str(), &format!(" {} ", to.to_lowercase()));
    }

    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '"' | '\'' | '-' | '_') {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| {
            synonyms
                .iter()
                .find(|(from, _)| from.to_lowercase() == word)
                .map(|(_, to)| to.to_lowercase())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split keywords into words on whitespace and punctuation.
pub fn split_words(keywords: &str) -> Vec<String> {
    keywords
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, INDEX_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| QuarryError::query(format!("not a date (yyyyMMdd or yyyy-MM-dd): {value}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QuarryError::query(format!("option {key} is not a number: {value}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" | "" => Ok(false),
        other => Err(QuarryError::query(format!("option {key} is not a boolean: {other}"))),
    }
}

/// Geographic constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoCriteria {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Radius in kilometres around the point.
    pub radius_km: Option<f64>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl GeoCriteria {
    /// Centre and radius, when all three are set.
    pub fn radius(&self) -> Option<(f64, f64, f64)> {
        Some((self.latitude?, self.longitude?, self.radius_km?))
    }

    /// Location fields that are set, as `(field, value)`.
    pub fn locations(&self) -> Vec<(&'static str, &str)> {
        [
            (keys::ZIP, &self.zip),
            (keys::CITY, &self.city),
            (keys::STATE, &self.state),
            (keys::COUNTRY, &self.country),
            (keys::REGION, &self.region),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
        .collect()
    }
}

/// Recency window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recency {
    /// Documents younger than this many days are boosted.
    pub max_days: u32,
    /// Boost of a document indexed today.
    pub multiplier: f32,
}

/// Immutable search options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCriteria {
    keywords: Option<String>,
    owner: String,
    recency: Option<Recency>,
    index_date_range: Option<(NaiveDate, NaiveDate)>,
    geo: GeoCriteria,
    sort: Option<(String, bool)>,
    score_only: bool,
    fuzzy: bool,
}

impl Default for QueryCriteria {
    fn default() -> Self {
        QueryCriteria {
            keywords: None,
            owner: ALL_OWNER.to_string(),
            recency: None,
            index_date_range: None,
            geo: GeoCriteria::default(),
            sort: None,
            score_only: false,
            fuzzy: false,
        }
    }
}

impl QueryCriteria {
    /// Start building criteria.
    pub fn builder() -> QueryCriteriaBuilder {
        QueryCriteriaBuilder::new()
    }

    /// Parse string options (see [`keys`]).
    pub fn from_options(
        options: &HashMap<String, String>,
        synonyms: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut builder = QueryCriteriaBuilder::new().with_synonyms(synonyms.clone());
        let get = |key: &str| options.get(key).map(String::as_str).filter(|v| !v.trim().is_empty());

        if let Some(keywords) = get(keys::KEYWORDS) {
            builder = builder.keywords(keywords);
        }
        if let Some(owner) = get(keys::OWNER) {
            builder = builder.owner(owner);
        }
        if let Some(days) = get(keys::RECENCY_MAX_DAYS) {
            let multiplier = get(keys::RECENCY_MULTIPLIER)
                .map(|m| parse_number::<f32>(keys::RECENCY_MULTIPLIER, m))
                .transpose()?
                .unwrap_or(1.0);
            builder = builder.recency(parse_number::<u32>(keys::RECENCY_MAX_DAYS, days)?, multiplier);
        }
        match (get(keys::INDEX_DATE_FROM), get(keys::INDEX_DATE_TO)) {
            (None, None) => {}
            (from, to) => {
                let from = from.map(parse_day).transpose()?.unwrap_or(NaiveDate::MIN);
                let to = to.map(parse_day).transpose()?.unwrap_or(NaiveDate::MAX);
                builder = builder.index_date_range(from, to);
            }
        }
        if let Some(v) = get(keys::LATITUDE) {
            builder = builder.latitude(parse_number::<f64>(keys::LATITUDE, v)?);
        }
        if let Some(v) = get(keys::LONGITUDE) {
            builder = builder.longitude(parse_number::<f64>(keys::LONGITUDE, v)?);
        }
        if let Some(v) = get(keys::RADIUS) {
            builder = builder.radius_km(parse_number::<f64>(keys::RADIUS, v)?);
        }
        for &field in LOCATION_FIELDS {
            if let Some(v) = get(field) {
                builder = builder.location(field, v)?;
            }
        }
        if let Some(field) = get(keys::SORT_FIELD) {
            let ascending = get(keys::SORT_ASCENDING)
                .map(|v| parse_flag(keys::SORT_ASCENDING, v))
                .transpose()?
                .unwrap_or(true);
            builder = builder.sort(field, ascending);
        }
        if let Some(v) = get(keys::SCORE_QUERY) {
            builder = builder.score_only(parse_flag(keys::SCORE_QUERY, v)?);
        }
        if let Some(v) = get(keys::FUZZY) {
            builder = builder.fuzzy(parse_flag(keys::FUZZY, v)?);
        }
        builder.build()
    }

    /// The options as strings, sorted by key.
    pub fn to_options(&self) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            options.insert(key.to_string(), value);
        };
        if let Some(keywords) = &self.keywords {
            put(keys::KEYWORDS, keywords.clone());
        }
        put(keys::OWNER, self.owner.clone());
        if let Some(recency) = self.recency {
            put(keys::RECENCY_MAX_DAYS, recency.max_days.to_string());
            put(keys::RECENCY_MULTIPLIER, recency.multiplier.to_string());
        }
        // open bounds are NaiveDate::MIN and MAX, which have no yyyyMMdd form
        if let Some((from, to)) = self.index_date_range {
            if from != NaiveDate::MIN {
                put(keys::INDEX_DATE_FROM, from.format(INDEX_DATE_FORMAT).to_string());
            }
            if to != NaiveDate::MAX {
                put(keys::INDEX_DATE_TO, to.format(INDEX_DATE_FORMAT).to_string());
            }
        }
        if let Some(v) = self.geo.latitude {
            put(keys::LATITUDE, v.to_string());
        }
        if let Some(v) = self.geo.longitude {
            put(keys::LONGITUDE, v.to_string());
        }
        if let Some(v) = self.geo.radius_km {
            put(keys::RADIUS, v.to_string());
        }
        for (field, value) in self.geo.locations() {
            put(field, value.to_string());
        }
        if let Some((field, ascending)) = &self.sort {
            put(keys::SORT_FIELD, field.clone());
            put(keys::SORT_ASCENDING, ascending.to_string());
        }
        if self.score_only {
            put(keys::SCORE_QUERY, "true".to_string());
        }
        if self.fuzzy {
            put(keys::FUZZY, "true".to_string());
        }
        options
    }

    /// Sanitized keywords.
    pub fn keywords(&self) -> Option<&str> {
        self.keywords.as_deref()
    }

    /// Keywords, or a query error when there are none.
    pub fn require_keywords(&self) -> Result<&str> {
        self.keywords()
            .ok_or_else(|| QuarryError::query("keywords are required"))
    }

    /// Inner text of keywords wrapped in double quotes.
    pub fn phrase(&self) -> Option<&str> {
        let keywords = self.keywords.as_deref()?;
        let inner = keywords.strip_prefix('"')?.strip_suffix('"')?.trim();
        (!inner.is_empty()).then_some(inner)
    }

    /// Keyword words split on whitespace and punctuation.
    pub fn words(&self) -> Vec<String> {
        self.keywords.as_deref().map(split_words).unwrap_or_default()
    }

    /// Owner the results must be visible to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether results are restricted to one owner.
    pub fn has_owner_filter(&self) -> bool {
        self.owner != ALL_OWNER
    }

    /// Recency window.
    pub fn recency(&self) -> Option<Recency> {
        self.recency
    }

    /// Inclusive index-date range.
    pub fn index_date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.index_date_range
    }

    /// Geographic constraints.
    pub fn geo(&self) -> &GeoCriteria {
        &self.geo
    }

    /// Requested sort field and direction.
    pub fn sort(&self) -> Option<(&str, bool)> {
        self.sort.as_ref().map(|(field, ascending)| (field.as_str(), *ascending))
    }

    /// Rank purely by the stored score field.
    pub fn is_score_only(&self) -> bool {
        self.score_only
    }

    /// Retry with fuzzy terms when nothing matches.
    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy
    }
}

/// Builder of [`QueryCriteria`].
#[derive(Debug, Clone, Default)]
pub struct QueryCriteriaBuilder {
    criteria: QueryCriteria,
    synonyms: HashMap<String, String>,
}

impl QueryCriteriaBuilder {
    /// Start from defaults: owner `all`, no keywords.
    pub fn new() -> Self {
        Self::default()
    }

    /// Synonyms substituted into keywords.
    pub fn with_synonyms(mut self, synonyms: HashMap<String, String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// Raw keywords; sanitized by [`build`](Self::build).
    pub fn keywords<S: Into<String>>(mut self, keywords: S) -> Self {
        self.criteria.keywords = Some(keywords.into());
        self
    }

    /// Owner filter; blank means every owner.
    pub fn owner<S: Into<String>>(mut self, owner: S) -> Self {
        let owner = owner.into();
        self.criteria.owner = if owner.trim().is_empty() {
            ALL_OWNER.to_string()
        } else {
            owner.trim().to_string()
        };
        self
    }

    /// Boost documents younger than `max_days`.
    pub fn recency(mut self, max_days: u32, multiplier: f32) -> Self {
        self.criteria.recency = Some(Recency { max_days, multiplier });
        self
    }

    /// Restrict to documents indexed between the days, both inclusive.
    /// Pass `NaiveDate::MIN` or `NaiveDate::MAX` to leave a side open.
    pub fn index_date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.criteria.index_date_range = Some((from, to));
        self
    }

    /// Latitude of the search centre.
    pub fn latitude(mut self, latitude: f64) -> Self {
        self.criteria.geo.latitude = Some(latitude);
        self
    }

    /// Longitude of the search centre.
    pub fn longitude(mut self, longitude: f64) -> Self {
        self.criteria.geo.longitude = Some(longitude);
        self
    }

    /// Search radius in kilometres.
    pub fn radius_km(mut self, radius_km: f64) -> Self {
        self.criteria.geo.radius_km = Some(radius_km);
        self
    }

    /// Exact location constraint; `field` is one of [`LOCATION_FIELDS`].
    pub fn location<V: Into<String>>(mut self, field: &str, value: V) -> Result<Self> {
        let slot = match field {
            keys::ZIP => &mut self.criteria.geo.zip,
            keys::CITY => &mut self.criteria.geo.city,
            keys::STATE => &mut self.criteria.geo.state,
            keys::COUNTRY => &mut self.criteria.geo.country,
            keys::REGION => &mut self.criteria.geo.region,
            other => return Err(QuarryError::query(format!("unknown location field: {other}"))),
        };
        *slot = Some(value.into());
        Ok(self)
    }

    /// Sort by a field before any policy sort fields.
    ///
    /// The value an index policy's `sorting_field` resolves to is indexed
    /// under [`SORT_FIELD`]; see [`sort_by_sorting_field`](Self::sort_by_sorting_field).
    pub fn sort<S: Into<String>>(mut self, field: S, ascending: bool) -> Self {
        self.criteria.sort = Some((field.into(), ascending));
        self
    }

    /// Sort by the index policy's `sorting_field`. Values compare as text
    /// unless the query policy declares a [`SORT_FIELD`] field with a type.
    pub fn sort_by_sorting_field(self, ascending: bool) -> Self {
        self.sort(SORT_FIELD, ascending)
    }

    /// Rank by the stored score instead of keyword relevance.
    pub fn score_only(mut self, enabled: bool) -> Self {
        self.criteria.score_only = enabled;
        self
    }

    /// Retry with fuzzy matching when nothing matches.
    pub fn fuzzy(mut self, enabled: bool) -> Self {
        self.criteria.fuzzy = enabled;
        self
    }

    /// Validate and sanitize.
    pub fn build(self) -> Result<QueryCriteria> {
        let QueryCriteriaBuilder {
            mut criteria,
            synonyms,
        } = self;

        criteria.keywords = criteria
            .keywords
            .map(|raw| sanitize_keywords(&raw, &synonyms))
            .filter(|k| !k.is_empty());

        if let Some(recency) = criteria.recency
            && !(recency.multiplier >= 0.0 && recency.multiplier.is_finite())
        {
            return Err(QuarryError::query("recency multiplier must be a non-negative number"));
        }
        if let Some((from, to)) = criteria.index_date_range
            && from > to
        {
            return Err(QuarryError::query(format!("index date range is reversed: {from} > {to}")));
        }

        let geo = &criteria.geo;
        let point = [geo.latitude, geo.longitude, geo.radius_km];
        let given = point.iter().filter(|v| v.is_some()).count();
        if given != 0 && given != 3 {
            return Err(QuarryError::query(
                "latitude, longitude and radius must be given together",
            ));
        }
        if let Some((latitude, longitude, radius)) = geo.radius()
            && (latitude.abs() > 90.0 || longitude.abs() > 180.0 || radius.is_nan() || radius < 0.0)
        {
            return Err(QuarryError::query(format!(
                "invalid geo criteria: ({latitude}, {longitude}) within {radius} km"
            )));
        }
        Ok(criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synonyms() -> HashMap<String, String> {
        HashMap::from([("&".to_string(), "and".to_string()), ("nyc".to_string(), "new york".to_string())])
    }

    #[test]
    fn test_sanitize() {
        let s = synonyms();
        assert_eq!(sanitize_keywords("  Salt & Pepper!! ", &s), "salt and pepper");
        assert_eq!(sanitize_keywords("Pizza in NYC?", &s), "pizza in new york");
        assert_eq!(sanitize_keywords("\"Rock-n-Roll\" <b>", &s), "\"rock-n-roll\" b");
        assert_eq!(sanitize_keywords("?!", &s), "");
    }

    #[test]
    fn test_builder_defaults_and_phrase() {
        let criteria = QueryCriteria::builder().keywords("\"Big Apple\"").build().unwrap();
        assert_eq!(criteria.owner(), ALL_OWNER);
        assert!(!criteria.has_owner_filter());
        assert_eq!(criteria.phrase(), Some("big apple"));
        assert_eq!(criteria.words(), vec!["big", "apple"]);

        let plain = QueryCriteria::builder().keywords("big apple").owner(" ").build().unwrap();
        assert_eq!(plain.phrase(), None);
        assert_eq!(plain.owner(), ALL_OWNER);
        assert!(QueryCriteria::builder().keywords("!!").build().unwrap().keywords().is_none());
    }

    #[test]
    fn test_validation() {
        assert!(QueryCriteria::builder().latitude(10.0).build().is_err());
        assert!(
            QueryCriteria::builder()
                .latitude(95.0)
                .longitude(0.0)
                .radius_km(5.0)
                .build()
                .is_err()
        );
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        assert!(QueryCriteria::builder().index_date_range(day(5), day(1)).build().is_err());
        assert!(QueryCriteria::builder().recency(10, -1.0).build().is_err());
        assert!(QueryCriteria::builder().location("planet", "earth").is_err());
    }

    #[test]
    fn test_options_roundtrip() {
        let options: HashMap<String, String> = [
            ("keywords", "Fish & Chips"),
            ("owner", "alice"),
            ("recencyMaxDays", "30"),
            ("recencyMultiplier", "2.5"),
            ("indexDateFrom", "2024-01-01"),
            ("indexDateTo", "20240131"),
            ("latitude", "51.5"),
            ("longitude", "-0.12"),
            ("radius", "10"),
            ("city", "London"),
            ("sortField", "price"),
            ("sortAscending", "false"),
            ("fuzzy", "yes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let criteria = QueryCriteria::from_options(&options, &synonyms()).unwrap();
        assert_eq!(criteria.keywords(), Some("fish and chips"));
        assert_eq!(criteria.owner(), "alice");
        assert_eq!(criteria.recency(), Some(Recency { max_days: 30, multiplier: 2.5 }));
        assert_eq!(criteria.geo().radius(), Some((51.5, -0.12, 10.0)));
        assert_eq!(criteria.geo().locations(), vec![("city", "London")]);
        assert_eq!(criteria.sort(), Some(("price", false)));
        assert!(criteria.is_fuzzy() && !criteria.is_score_only());

        let back: HashMap<String, String> = criteria.to_options().into_iter().collect();
        let reparsed = QueryCriteria::from_options(&back, &HashMap::new()).unwrap();
        assert_eq!(reparsed, criteria);
    }

    #[test]
    fn test_open_index_date_range() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let from_only = HashMap::from([("indexDateFrom".to_string(), "20240101".to_string())]);
        let criteria = QueryCriteria::from_options(&from_only, &HashMap::new()).unwrap();
        assert_eq!(criteria.index_date_range(), Some((day(1), NaiveDate::MAX)));
        let back: HashMap<String, String> = criteria.to_options().into_iter().collect();
        assert_eq!(back.get("indexDateFrom").map(String::as_str), Some("20240101"));
        assert!(!back.contains_key("indexDateTo"));
        assert_eq!(QueryCriteria::from_options(&back, &HashMap::new()).unwrap(), criteria);

        let to_only = HashMap::from([("indexDateTo".to_string(), "2024-01-05".to_string())]);
        let criteria = QueryCriteria::from_options(&to_only, &HashMap::new()).unwrap();
        assert_eq!(criteria.index_date_range(), Some((NaiveDate::MIN, day(5))));
    }

    #[test]
    fn test_sort_by_sorting_field() {
        let criteria = QueryCriteria::builder().sort_by_sorting_field(false).build().unwrap();
        assert_eq!(criteria.sort(), Some((SORT_FIELD, false)));
    }

    #[test]
    fn test_bad_options() {
        let options = HashMap::from([("radius".to_string(), "far".to_string())]);
        assert!(QueryCriteria::from_options(&options, &HashMap::new()).is_err());
    }
}
