//! Index-time policy: which document values become index fields, and how.

use serde::{Deserialize, Deserializer, Serialize};

use crate::document::path::FieldPath;
use crate::error::{QuarryError, Result};
use crate::policy::{NamedField, RESERVED_FIELDS, upsert_all};

/// Per-field indexing instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexField {
    /// Path expression resolved against the document (`tags[rank]`, `meta{k}`).
    pub name: String,
    /// Keep the value retrievable from search hits.
    pub store_in_index: bool,
    /// Strip markup before indexing.
    pub html_to_text: bool,
    /// The value is the latitude of the document location.
    pub spatial_latitude: bool,
    /// The value is the longitude of the document location.
    pub spatial_longitude: bool,
    /// Full tokenization with term vectors.
    pub tokenize: bool,
    /// Standard analysis without term vectors.
    pub analyze: bool,
    /// Field weight; zero means no boost.
    pub boost: f32,
}

impl Default for IndexField {
    fn default() -> Self {
        IndexField {
            name: String::new(),
            store_in_index: true,
            html_to_text: false,
            spatial_latitude: false,
            spatial_longitude: false,
            tokenize: false,
            analyze: false,
            boost: 0.0,
        }
    }
}

impl IndexField {
    /// A stored, untokenized field.
    pub fn new<S: Into<String>>(name: S) -> Self {
        IndexField {
            name: name.into(),
            ..IndexField::default()
        }
    }

    /// Enable full tokenization.
    pub fn tokenized(mut self) -> Self {
        self.tokenize = true;
        self
    }

    /// Enable standard analysis.
    pub fn analyzed(mut self) -> Self {
        self.analyze = true;
        self
    }

    /// Do not store the value.
    pub fn unstored(mut self) -> Self {
        self.store_in_index = false;
        self
    }

    /// Strip markup before indexing.
    pub fn html(mut self) -> Self {
        self.html_to_text = true;
        self
    }

    /// Mark as the latitude of the document.
    pub fn latitude(mut self) -> Self {
        self.spatial_latitude = true;
        self
    }

    /// Mark as the longitude of the document.
    pub fn longitude(mut self) -> Self {
        self.spatial_longitude = true;
        self
    }

    /// Set the field boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Whether the value is split into terms.
    pub fn is_analyzed(&self) -> bool {
        self.tokenize || self.analyze
    }
}

impl NamedField for IndexField {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Declarative indexing policy.
///
/// Fields are unique by name; adding a field with an existing name replaces
/// it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexPolicy {
    /// Static score stored with every record; emitted when positive.
    pub score: i32,
    /// Record-level boost; applied when positive.
    pub boost: f32,
    /// Analyzer name; the configured default when absent.
    pub analyzer: Option<String>,
    /// Train the spelling dictionary with analyzed values.
    pub add_to_dictionary: bool,
    /// Visibility owner; the wildcard owner when absent.
    pub owner: Option<String>,
    /// Path whose value becomes the record sort key.
    pub sorting_field: Option<String>,
    /// Path whose value replaces the document id in the index.
    pub custom_id_field: Option<String>,
    #[serde(deserialize_with = "deserialize_index_fields")]
    fields: Vec<IndexField>,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        IndexPolicy {
            score: 0,
            boost: 0.0,
            analyzer: None,
            add_to_dictionary: false,
            owner: None,
            sorting_field: None,
            custom_id_field: None,
            fields: Vec::new(),
        }
    }
}

fn deserialize_index_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<IndexField>, D::Error> {
    let raw = Vec::<IndexField>::deserialize(deserializer)?;
    let mut fields = Vec::with_capacity(raw.len());
    upsert_all(&mut fields, raw);
    Ok(fields)
}

impl IndexPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn add_field(&mut self, field: IndexField) {
        upsert_all(&mut self.fields, std::iter::once(field));
    }

    /// Builder-style [`add_field`](Self::add_field).
    pub fn with_field(mut self, field: IndexField) -> Self {
        self.add_field(field);
        self
    }

    /// Fields in definition order.
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    /// Look a field up by name.
    pub fn field(&self, name: &str) -> Option<&IndexField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Remove a field by name.
    pub fn remove_field(&mut self, name: &str) -> Option<IndexField> {
        let position = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(position))
    }

    /// Check field paths and reserved names.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(QuarryError::config("index policy has no fields"));
        }
        for field in &self.fields {
            let path = FieldPath::parse(&field.name)?;
            if RESERVED_FIELDS.contains(&path.to_string().as_str()) {
                return Err(QuarryError::config(format!(
                    "field '{}' collides with a reserved index field",
                    field.name
                )));
            }
            if field.spatial_latitude && field.spatial_longitude {
                return Err(QuarryError::config(format!(
                    "field '{}' cannot be both latitude and longitude",
                    field.name
                )));
            }
        }
        for path in [&self.sorting_field, &self.custom_id_field].into_iter().flatten() {
            FieldPath::parse(path)?;
        }
        Ok(())
    }

    /// JSON form of the policy.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Policy from its JSON form.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexPolicy {
        let mut policy = IndexPolicy::new()
            .with_field(IndexField::new("title").tokenized().with_boost(2.0))
            .with_field(IndexField::new("tags[rank]").analyzed())
            .with_field(IndexField::new("meta{k}").unstored())
            .with_field(IndexField::new("lat").latitude());
        policy.score = 5;
        policy.boost = 1.5;
        policy.analyzer = Some("simple".to_string());
        policy.add_to_dictionary = true;
        policy.owner = Some("alice".to_string());
        policy.sorting_field = Some("title".to_string());
        policy
    }

    #[test]
    fn test_roundtrip_through_json() {
        let policy = sample();
        let json = policy.to_json().unwrap();
        assert_eq!(json["fields"].as_array().unwrap().len(), 4);
        assert_eq!(json["fields"][0]["storeInIndex"], true);

        let restored = IndexPolicy::from_json(json).unwrap();
        assert_eq!(restored, policy);
        assert_eq!(restored.fields().len(), 4);
        let title = restored.field("title").unwrap();
        assert_eq!(title.boost, 2.0);
        assert!(title.tokenize);
        assert!(!title.analyze);
        assert!(restored.field("tags[rank]").unwrap().analyze);
        assert!(!restored.field("meta{k}").unwrap().store_in_index);
        assert_eq!(restored.score, 5);
        assert_eq!(restored.boost, 1.5);
    }

    #[test]
    fn test_last_write_wins() {
        let policy = IndexPolicy::new()
            .with_field(IndexField::new("title"))
            .with_field(IndexField::new("body"))
            .with_field(IndexField::new("title").with_boost(3.0));

        assert_eq!(policy.fields().len(), 2);
        assert_eq!(policy.fields()[0].name, "title");
        assert_eq!(policy.fields()[0].boost, 3.0);

        let json = serde_json::json!({"fields": [{"name": "a"}, {"name": "a", "boost": 4.0}]});
        let parsed = IndexPolicy::from_json(json).unwrap();
        assert_eq!(parsed.fields().len(), 1);
        assert_eq!(parsed.fields()[0].boost, 4.0);
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());
        assert!(IndexPolicy::new().validate().is_err());
        assert!(IndexPolicy::new().with_field(IndexField::new("id")).validate().is_err());
        assert!(IndexPolicy::new().with_field(IndexField::new("tags[")).validate().is_err());
    }
}
