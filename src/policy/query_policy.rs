//! Query-time policies: searched fields, boosts, sorting and lookups.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QuarryError, Result};
use crate::policy::{NamedField, upsert_all};

/// Value type of a field, used to compare sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// Lexicographic comparison.
    #[default]
    String,
    /// Signed integer comparison.
    Integer,
    /// Floating point comparison.
    Double,
}

/// One searched (and optionally sorted) field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryField {
    /// Index field name.
    pub name: String,
    /// 0 leaves the field unsorted; lower positive values sort first.
    pub sort_order: u32,
    /// Sort direction when sorted.
    pub ascending_sort: bool,
    /// Weight of matches in this field.
    pub boost: f32,
    /// Comparator type for sorting.
    pub field_type: FieldType,
}

impl Default for QueryField {
    fn default() -> Self {
        QueryField {
            name: String::new(),
            sort_order: 0,
            ascending_sort: true,
            boost: 1.0,
            field_type: FieldType::String,
        }
    }
}

impl QueryField {
    /// An unsorted field with boost 1.
    pub fn new<S: Into<String>>(name: S) -> Self {
        QueryField {
            name: name.into(),
            ..QueryField::default()
        }
    }

    /// Set the boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Sort by this field at the given priority.
    pub fn sorted(mut self, sort_order: u32, ascending: bool, field_type: FieldType) -> Self {
        self.sort_order = sort_order;
        self.ascending_sort = ascending;
        self.field_type = field_type;
        self
    }

    /// Boost to use when building clauses; non-positive boosts count as 1.
    pub fn effective_boost(&self) -> f32 {
        if self.boost > 0.0 { self.boost } else { 1.0 }
    }
}

impl NamedField for QueryField {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Fields searched by keyword queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryPolicy {
    #[serde(deserialize_with = "deserialize_query_fields")]
    fields: Vec<QueryField>,
}

fn deserialize_query_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<QueryField>, D::Error> {
    let raw = Vec::<QueryField>::deserialize(deserializer)?;
    let mut fields = Vec::with_capacity(raw.len());
    upsert_all(&mut fields, raw);
    Ok(fields)
}

impl QueryPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn add_field(&mut self, field: QueryField) {
        upsert_all(&mut self.fields, std::iter::once(field));
    }

    /// Builder-style [`add_field`](Self::add_field).
    pub fn with_field(mut self, field: QueryField) -> Self {
        self.add_field(field);
        self
    }

    /// Fields in definition order.
    pub fn fields(&self) -> &[QueryField] {
        &self.fields
    }

    /// Look a field up by name.
    pub fn field(&self, name: &str) -> Option<&QueryField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Sorted fields by ascending sort order; ties keep definition order.
    pub fn sort_fields(&self) -> Vec<&QueryField> {
        let mut sorted: Vec<&QueryField> = self.fields.iter().filter(|f| f.sort_order > 0).collect();
        sorted.sort_by_key(|f| f.sort_order);
        sorted
    }

    /// A query policy needs at least one field.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(QuarryError::config("query policy has no fields"));
        }
        if let Some(blank) = self.fields.iter().find(|f| f.name.trim().is_empty()) {
            return Err(QuarryError::config(format!("query field with blank name: {blank:?}")));
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

/// Query policy for autocomplete lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupPolicy {
    #[serde(flatten)]
    query: QueryPolicy,
    /// Stored field whose distinct values are returned.
    pub field_to_return: String,
    /// Index providing spelling dictionary training data.
    #[serde(default)]
    pub dictionary_index: Option<String>,
    /// Field of `dictionary_index` whose terms train the dictionary.
    #[serde(default)]
    pub dictionary_field: Option<String>,
}

impl LookupPolicy {
    /// Create a lookup policy returning `field_to_return`.
    pub fn new<S: Into<String>>(query: QueryPolicy, field_to_return: S) -> Self {
        LookupPolicy {
            query,
            field_to_return: field_to_return.into(),
            dictionary_index: None,
            dictionary_field: None,
        }
    }

    /// Name the dictionary source.
    pub fn with_dictionary<I: Into<String>, F: Into<String>>(mut self, index: I, field: F) -> Self {
        self.dictionary_index = Some(index.into());
        self.dictionary_field = Some(field.into());
        self
    }

    /// The underlying query policy.
    pub fn query_policy(&self) -> &QueryPolicy {
        &self.query
    }

    /// Requires fields and a return field.
    pub fn validate(&self) -> Result<()> {
        self.query.validate()?;
        if self.field_to_return.trim().is_empty() {
            return Err(QuarryError::config("lookup policy requires fieldToReturn"));
        }
        if self.dictionary_index.is_some() != self.dictionary_field.is_some() {
            return Err(QuarryError::config(
                "dictionaryIndex and dictionaryField must be set together",
            ));
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

impl Deref for LookupPolicy {
    type Target = QueryPolicy;

    fn deref(&self) -> &QueryPolicy {
        &self.query
    }
}

impl DerefMut for LookupPolicy {
    fn deref_mut(&mut self) -> &mut QueryPolicy {
        &mut self.query
    }
}
