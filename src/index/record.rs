//! Records handed to the index writer.
//!
//! A record is the engine-level view of a document: a flat list of named
//! values, each with its own store/index/tokenize switches. The indexer
//! builds records from documents and policies; the writer never sees either.

use serde::{Deserialize, Serialize};

/// Database the document belongs to.
pub const DATABASE_FIELD: &str = "database";
/// Document id within its database.
pub const ID_FIELD: &str = "id";
/// Store id of a record whose [`ID_FIELD`] holds a custom id. When present
/// it keys the record instead of [`ID_FIELD`].
pub const KEY_FIELD: &str = "_key";
/// Day the record was indexed, formatted as [`INDEX_DATE_FORMAT`].
pub const INDEX_DATE_FIELD: &str = "indexDate";
/// Static policy score.
pub const SCORE_FIELD: &str = "score";
/// Visibility owner.
pub const OWNER_FIELD: &str = "owner";
/// Policy-defined sort key.
pub const SORT_FIELD: &str = "sortField";
/// Document latitude in degrees.
pub const LATITUDE_FIELD: &str = "_lat";
/// Document longitude in degrees.
pub const LONGITUDE_FIELD: &str = "_lng";

/// Owner value visible to every caller.
pub const ALL_OWNER: &str = "all";

/// chrono format of [`INDEX_DATE_FIELD`] values.
pub const INDEX_DATE_FORMAT: &str = "%Y%m%d";

/// One value of a record together with its indexing switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexableField {
    /// Field name.
    pub name: String,
    /// Textual value.
    pub value: String,
    /// Return the value with search hits.
    pub stored: bool,
    /// Make the value searchable.
    pub indexed: bool,
    /// Split the value with the index analyzer instead of keeping one term.
    pub tokenized: bool,
    /// Keep per-document term frequencies for similarity queries.
    pub term_vectors: bool,
    /// Weight applied to matches in this field.
    pub boost: f32,
    /// Numeric column value for scoring, filtering and sorting.
    pub numeric: Option<f64>,
}

impl IndexableField {
    /// Stored, indexed, single-term field.
    pub fn keyword<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        IndexableField {
            name: name.into(),
            value: value.into(),
            stored: true,
            indexed: true,
            tokenized: false,
            term_vectors: false,
            boost: 1.0,
            numeric: None,
        }
    }

    /// Stored, indexed, analyzed field.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        IndexableField {
            tokenized: true,
            ..Self::keyword(name, value)
        }
    }

    /// Stored numeric field indexed as a single term.
    pub fn numeric<N: Into<String>>(name: N, value: f64) -> Self {
        IndexableField {
            numeric: Some(value),
            ..Self::keyword(name, format_number(value))
        }
    }

    /// Keep the value out of search hits.
    pub fn unstored(mut self) -> Self {
        self.stored = false;
        self
    }

    /// Store without indexing.
    pub fn stored_only(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Record term vectors.
    pub fn with_term_vectors(mut self) -> Self {
        self.term_vectors = true;
        self
    }

    /// Set the field boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Attach a numeric column value.
    pub fn with_numeric(mut self, value: f64) -> Self {
        self.numeric = Some(value);
        self
    }
}

/// Render a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A flat record ready for the index writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    fields: Vec<IndexableField>,
    /// Weight applied to every field of the record.
    pub boost: f32,
}

impl Default for IndexRecord {
    fn default() -> Self {
        IndexRecord {
            fields: Vec::new(),
            boost: 1.0,
        }
    }
}

impl IndexRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; names may repeat.
    pub fn add(&mut self, field: IndexableField) {
        self.fields.push(field);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with_field(mut self, field: IndexableField) -> Self {
        self.add(field);
        self
    }

    /// Set the record boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[IndexableField] {
        &self.fields
    }

    /// First value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Whether a field was emitted.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// `(database, id)` the record is replaced and deleted by.
    pub fn key(&self) -> Option<(&str, &str)> {
        let database = self.get(DATABASE_FIELD)?;
        let id = self.get(KEY_FIELD).or_else(|| self.get(ID_FIELD))?;
        Some((database, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefers_store_id() {
        let record = IndexRecord::new()
            .with_field(IndexableField::keyword(DATABASE_FIELD, "shop"))
            .with_field(IndexableField::keyword(ID_FIELD, "SKU-42"));
        assert_eq!(record.key(), Some(("shop", "SKU-42")));

        let record = record.with_field(IndexableField::keyword(KEY_FIELD, "internal-1").unstored());
        assert_eq!(record.key(), Some(("shop", "internal-1")));
        assert_eq!(IndexRecord::new().key(), None);
    }

    #[test]
    fn test_field_switches() {
        let field = IndexableField::text("title", "Hello World").with_boost(2.0);
        assert!(field.tokenized && field.stored && field.indexed);
        assert_eq!(field.boost, 2.0);

        let field = IndexableField::numeric(SCORE_FIELD, 5.0).unstored();
        assert_eq!(field.value, "5");
        assert_eq!(field.numeric, Some(5.0));
        assert!(!field.stored);
        assert!(!field.tokenized);
    }

    #[test]
    fn test_record_lookup() {
        let record = IndexRecord::new()
            .with_field(IndexableField::keyword(ID_FIELD, "1"))
            .with_field(IndexableField::keyword("tag", "a"))
            .with_field(IndexableField::keyword("tag", "b"))
            .with_boost(1.5);

        assert_eq!(record.get("tag"), Some("a"));
        assert!(record.contains(ID_FIELD));
        assert!(!record.contains("missing"));
        assert_eq!(record.fields().len(), 3);
        assert_eq!(record.boost, 1.5);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
