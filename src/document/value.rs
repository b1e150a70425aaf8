//! Attribute values carried by documents.
//!
//! [`AttributeValue`] is a tagged union over everything a JSON document can
//! hold. [`Attributes`] keeps attribute names in insertion order, which is the
//! order a document was populated in.

use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::{QuarryError, Result};

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum AttributeValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
    /// Ordered list of values.
    List(Vec<AttributeValue>),
    /// Nested object.
    Map(Attributes),
}

impl AttributeValue {
    /// Get the value as text if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a float if it is numeric or numeric text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the list elements if this is a list.
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the nested attributes if this is a map.
    pub fn as_map(&self) -> Option<&Attributes> {
        match self {
            AttributeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Plain-text rendering used for indexing.
    ///
    /// Scalars render as themselves, lists join their elements with a space
    /// and maps render as `key value` pairs. Null renders as an empty string.
    pub fn to_text(&self) -> String {
        match self {
            AttributeValue::Null => String::new(),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Float(f) => format_float(*f),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::List(items) => items
                .iter()
                .map(AttributeValue::to_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            AttributeValue::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{k} {}", v.to_text()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(value: Vec<AttributeValue>) -> Self {
        AttributeValue::List(value)
    }
}

impl From<Attributes> for AttributeValue {
    fn from(value: Attributes) -> Self {
        AttributeValue::Map(value)
    }
}

impl From<AttributeValue> for Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(b),
            AttributeValue::Integer(i) => Value::Number(i.into()),
            AttributeValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            AttributeValue::String(s) => Value::String(s),
            AttributeValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            AttributeValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Value> for AttributeValue {
    type Error = QuarryError;

    fn try_from(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    AttributeValue::Float(f)
                } else {
                    return Err(QuarryError::other(format!("unsupported number: {n}")));
                }
            }
            Value::String(s) => AttributeValue::String(s),
            Value::Array(items) => AttributeValue::List(
                items
                    .into_iter()
                    .map(AttributeValue::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut attributes = Attributes::new();
                for (k, v) in map {
                    attributes.insert(k, AttributeValue::try_from(v)?);
                }
                AttributeValue::Map(attributes)
            }
        })
    }
}

/// Attribute name to value map preserving insertion order.
///
/// Re-inserting an existing name replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, AttributeValue)>,
}

impl Attributes {
    /// Create an empty map.
    pub fn new() -> Self {
        Attributes {
            entries: Vec::new(),
        }
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: AttributeValue) -> Option<AttributeValue> {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Get a value by name.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Remove a value by name, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let position = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Whether the name is present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Attribute names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match AttributeValue::try_from(Value::deserialize(deserializer)?).map_err(D::Error::custom)? {
            AttributeValue::Map(map) => Ok(map),
            _ => Err(D::Error::custom("expected a JSON object")),
        }
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttributeValue);
    type IntoIter = std::vec::IntoIter<(String, AttributeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, AttributeValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (S, AttributeValue)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (k, v) in iter {
            attributes.insert(k, v);
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut attrs = Attributes::new();
        attrs.insert("title", "a".into());
        attrs.insert("body", "b".into());
        let previous = attrs.insert("title", "c".into());

        assert_eq!(previous, Some(AttributeValue::from("a")));
        assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["title", "body"]);
        assert_eq!(attrs.get("title").and_then(|v| v.as_str()), Some("c"));
    }

    #[test]
    fn test_json_conversion_preserves_shape() {
        let value = json!({"z": 1, "a": [true, 2.5, "x"], "m": {"k": null}});
        let attr = AttributeValue::try_from(value.clone()).unwrap();

        let map = attr.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(map.get("z"), Some(&AttributeValue::Integer(1)));
        assert_eq!(Value::from(attr), value);
    }

    #[test]
    fn test_to_text() {
        let list = AttributeValue::List(vec!["a".into(), 2i64.into(), AttributeValue::Null]);
        assert_eq!(list.to_text(), "a 2");
        assert_eq!(AttributeValue::Float(3.0).to_text(), "3");
        assert_eq!(AttributeValue::Float(3.25).to_text(), "3.25");

        let map: Attributes = vec![("k", AttributeValue::from("v"))].into_iter().collect();
        assert_eq!(AttributeValue::Map(map).to_text(), "k v");
    }

    #[test]
    fn test_as_f64_parses_text() {
        assert_eq!(AttributeValue::from(" 4.5 ").as_f64(), Some(4.5));
        assert_eq!(AttributeValue::from("x").as_f64(), None);
        assert_eq!(AttributeValue::Integer(7).as_f64(), Some(7.0));
    }
}
