//! Field path expressions.
//!
//! Policies name the values they index with a small path language:
//!
//! | Expression   | Meaning                                                   |
//! |--------------|-----------------------------------------------------------|
//! | `name`       | the attribute itself (dots walk nested objects)           |
//! | `name[3]`    | element 3 of the list at `name`                           |
//! | `name[key]`  | `key` of every object in the list at `name`, space-joined |
//! | `name{key}`  | `key` of the object at `name`                             |
//!
//! After resolution, JSON punctuation (`,;:[]{}()`) and whitespace runs are
//! collapsed to single spaces.
//!
//! ```
//! use quarry::document::path::FieldPath;
//! use quarry::document::value::Attributes;
//!
//! let attrs: Attributes = serde_json::from_str(r#"{"tags":[{"rank":"5"},{"rank":"7"}]}"#).unwrap();
//! let path = FieldPath::parse("tags[rank]").unwrap();
//! assert_eq!(path.resolve(&attrs), Some("5 7".to_string()));
//! ```

use std::fmt;
use std::sync::LazyLock;

use log::warn;
use regex::Regex;

use crate::document::value::{AttributeValue, Attributes};
use crate::error::{QuarryError, Result};

static PUNCTUATION_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;:\[\]{}()\s]+").expect("valid punctuation pattern"));

/// Subscript applied to the value at the path's base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    /// No subscript.
    None,
    /// `[n]`: list element by position.
    Index(usize),
    /// `[key]`: key applied to every object of a list.
    ArrayKey(String),
    /// `{key}`: key of a nested object.
    HashKey(String),
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    name: String,
    subscript: Subscript,
}

impl FieldPath {
    /// Parse an expression. Unbalanced brackets, empty names and trailing
    /// text after the subscript are configuration errors.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let malformed = || QuarryError::config(format!("malformed field path '{expression}'"));

        let Some(open) = expression.find(['[', '{']) else {
            if expression.is_empty() || expression.contains([']', '}']) {
                return Err(malformed());
            }
            return Ok(FieldPath {
                name: expression.to_string(),
                subscript: Subscript::None,
            });
        };

        let name = &expression[..open];
        let close_char = if expression[open..].starts_with('[') { ']' } else { '}' };
        if name.is_empty() || !expression.ends_with(close_char) {
            return Err(malformed());
        }
        let inner = expression[open + 1..expression.len() - 1].trim();
        if inner.is_empty() || inner.contains(['[', ']', '{', '}']) {
            return Err(malformed());
        }

        let subscript = match close_char {
            ']' => match inner.parse::<usize>() {
                Ok(index) => Subscript::Index(index),
                Err(_) => Subscript::ArrayKey(inner.to_string()),
            },
            _ => Subscript::HashKey(inner.to_string()),
        };

        Ok(FieldPath {
            name: name.to_string(),
            subscript,
        })
    }

    /// The base attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The subscript part.
    pub fn subscript(&self) -> &Subscript {
        &self.subscript
    }

    /// Resolve this path against a document's attributes.
    ///
    /// A missing base attribute yields `None`. A value whose shape does not
    /// fit the subscript is logged and also yields `None`.
    pub fn resolve(&self, attributes: &Attributes) -> Option<String> {
        let value = self.resolve_raw(attributes)?;
        let normalized = normalize_punctuation(&value);
        (!normalized.is_empty()).then_some(normalized)
    }

    /// Resolve without collapsing punctuation, for values that still need
    /// markup stripping.
    pub fn resolve_raw(&self, attributes: &Attributes) -> Option<String> {
        let base = lookup(attributes, &self.name)?;
        let value = match &self.subscript {
            Subscript::None => Some(base.to_text()),
            Subscript::Index(index) => match base {
                AttributeValue::List(items) => items.get(*index).map(AttributeValue::to_text),
                AttributeValue::Map(map) => map.get(&index.to_string()).map(AttributeValue::to_text),
                _ => self.shape_mismatch("a list"),
            },
            Subscript::ArrayKey(key) => match base {
                AttributeValue::List(items) => {
                    let values: Vec<String> = items
                        .iter()
                        .filter_map(|item| match item {
                            AttributeValue::Map(map) => map.get(key).map(AttributeValue::to_text),
                            _ => {
                                warn!("field '{}': list element is not an object, skipped", self);
                                None
                            }
                        })
                        .filter(|s| !s.is_empty())
                        .collect();
                    (!values.is_empty()).then(|| values.join(" "))
                }
                AttributeValue::Map(map) => map.get(key).map(AttributeValue::to_text),
                _ => self.shape_mismatch("a list"),
            },
            Subscript::HashKey(key) => match base {
                AttributeValue::Map(map) => map.get(key).map(AttributeValue::to_text),
                _ => self.shape_mismatch("an object"),
            },
        }?;

        (!value.trim().is_empty()).then_some(value)
    }

    fn shape_mismatch(&self, expected: &str) -> Option<String> {
        warn!("field '{}': value of '{}' is not {expected}", self, self.name);
        None
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subscript {
            Subscript::None => write!(f, "{}", self.name),
            Subscript::Index(i) => write!(f, "{}[{i}]", self.name),
            Subscript::ArrayKey(k) => write!(f, "{}[{k}]", self.name),
            Subscript::HashKey(k) => write!(f, "{}{{{k}}}", self.name),
        }
    }
}

/// Exact attribute first, then a dotted walk through nested objects.
fn lookup<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a AttributeValue> {
    if let Some(value) = attributes.get(name) {
        return Some(value);
    }
    let mut parts = name.split('.');
    let mut current = attributes.get(parts.next()?)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// Collapse JSON punctuation and whitespace runs into single spaces.
pub fn normalize_punctuation(value: &str) -> String {
    PUNCTUATION_RUN.replace_all(value, " ").trim().to_string()
}

/// Parse and resolve in one step.
pub fn resolve_field(attributes: &Attributes, expression: &str) -> Result<Option<String>> {
    Ok(FieldPath::parse(expression)?.resolve(attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(json: &str) -> Attributes {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(FieldPath::parse("title").unwrap().subscript(), &Subscript::None);
        assert_eq!(FieldPath::parse("tags[0]").unwrap().subscript(), &Subscript::Index(0));
        assert_eq!(
            FieldPath::parse("tags[rank]").unwrap().subscript(),
            &Subscript::ArrayKey("rank".to_string())
        );
        assert_eq!(
            FieldPath::parse("meta{k}").unwrap().subscript(),
            &Subscript::HashKey("k".to_string())
        );
        assert_eq!(FieldPath::parse("meta{k}").unwrap().to_string(), "meta{k}");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "[x]", "tags[", "tags[]", "tags[a]b", "meta{k]", "a]", "x[[y]]"] {
            assert!(FieldPath::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_array_key_flattens() {
        let doc = attrs(r#"{"tags":[{"rank":"5"},{"rank":"7"}]}"#);
        assert_eq!(resolve_field(&doc, "tags[rank]").unwrap(), Some("5 7".to_string()));

        let numeric = attrs(r#"{"tags":[{"rank":5},{"other":1},{"rank":7}]}"#);
        assert_eq!(resolve_field(&numeric, "tags[rank]").unwrap(), Some("5 7".to_string()));
    }

    #[test]
    fn test_array_index() {
        let doc = attrs(r#"{"tags":["a","b"]}"#);
        assert_eq!(resolve_field(&doc, "tags[0]").unwrap(), Some("a".to_string()));
        assert_eq!(resolve_field(&doc, "tags[1]").unwrap(), Some("b".to_string()));
        assert_eq!(resolve_field(&doc, "tags[5]").unwrap(), None);
    }

    #[test]
    fn test_hash_key() {
        let doc = attrs(r#"{"meta":{"k":"v"}}"#);
        assert_eq!(resolve_field(&doc, "meta{k}").unwrap(), Some("v".to_string()));
        assert_eq!(resolve_field(&doc, "meta{missing}").unwrap(), None);
    }

    #[test]
    fn test_array_subscript_on_object_falls_back_to_key() {
        let doc = attrs(r#"{"meta":{"k":"v"}}"#);
        assert_eq!(resolve_field(&doc, "meta[k]").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_shape_mismatch_is_none() {
        let doc = attrs(r#"{"title":"plain","tags":["a"]}"#);
        assert_eq!(resolve_field(&doc, "title{k}").unwrap(), None);
        assert_eq!(resolve_field(&doc, "title[k]").unwrap(), None);
        assert_eq!(resolve_field(&doc, "tags{k}").unwrap(), None);
    }

    #[test]
    fn test_missing_field_is_none() {
        let doc = attrs(r#"{"title":"x"}"#);
        assert_eq!(resolve_field(&doc, "body").unwrap(), None);
    }

    #[test]
    fn test_punctuation_collapsed() {
        let doc = attrs(r#"{"loc":"New York,  NY; (USA)", "n":{"a":{"b":"deep"}}}"#);
        assert_eq!(resolve_field(&doc, "loc").unwrap(), Some("New York NY USA".to_string()));
        assert_eq!(resolve_field(&doc, "n.a.b").unwrap(), Some("deep".to_string()));
    }
}
