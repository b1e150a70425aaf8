//! Conversion between documents and their JSON form.
//!
//! The wire form is a JSON object whose keys become attribute names. The
//! reserved keys `_id`, `_rev` and `_database` carry identity metadata and are
//! never turned into attributes.

use serde_json::{Map, Value};

use crate::document::document::Document;
use crate::document::value::{AttributeValue, Attributes};
use crate::error::{QuarryError, Result};

/// Reserved key holding the document id.
pub const ID_KEY: &str = "_id";

/// Reserved key holding the revision token.
pub const REVISION_KEY: &str = "_rev";

/// Reserved key holding the database name.
pub const DATABASE_KEY: &str = "_database";

/// Build a document from a JSON object.
///
/// `default_database` is used when the object carries no `_database` key.
pub fn document_from_json(default_database: &str, value: Value) -> Result<Document> {
    let Value::Object(mut object) = value else {
        return Err(QuarryError::conversion(
            "document must be a JSON object",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "not an object"),
        ));
    };

    let database = match object.remove(DATABASE_KEY) {
        Some(Value::String(db)) if !db.is_empty() => db,
        _ => default_database.to_string(),
    };
    let id = object.remove(ID_KEY).map(scalar_to_string);
    let revision = object.remove(REVISION_KEY).map(scalar_to_string);

    let mut attributes = Attributes::new();
    for (name, value) in object {
        attributes.insert(name, AttributeValue::try_from(value)?);
    }

    let mut builder = Document::builder(database).attributes(attributes);
    if let Some(id) = id {
        builder = builder.id(id);
    }
    if let Some(revision) = revision {
        builder = builder.revision(revision);
    }
    builder.build()
}

/// Parse a JSON text into a document.
pub fn document_from_str(default_database: &str, json: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| QuarryError::conversion("malformed document JSON", e))?;
    document_from_json(default_database, value)
}

/// JSON form of a document including the reserved identity keys.
pub fn document_to_json(document: &Document) -> Value {
    let mut object = Map::new();
    if let Some(id) = document.id() {
        object.insert(ID_KEY.to_string(), Value::String(id.to_string()));
    }
    if let Some(revision) = document.revision() {
        object.insert(REVISION_KEY.to_string(), Value::String(revision.to_string()));
    }
    object.insert(
        DATABASE_KEY.to_string(),
        Value::String(document.database().to_string()),
    );
    for (name, value) in document.attributes().iter() {
        object.insert(name.to_string(), Value::from(value.clone()));
    }
    Value::Object(object)
}

/// JSON projection of the attributes only, used by field-path resolution.
pub fn attributes_to_json(attributes: &Attributes) -> Value {
    Value::from(AttributeValue::Map(attributes.clone()))
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_keys_become_metadata() {
        let doc = document_from_json(
            "fallback",
            json!({"_id": 42, "_rev": "1-a", "_database": "news", "title": "Hi"}),
        )
        .unwrap();

        assert_eq!(doc.database(), "news");
        assert_eq!(doc.id(), Some("42"));
        assert_eq!(doc.revision(), Some("1-a"));
        assert_eq!(doc.attributes().len(), 1);
    }

    #[test]
    fn test_default_database_and_roundtrip() {
        let doc = document_from_str("news", r#"{"_id":"a","tags":["x","y"]}"#).unwrap();
        assert_eq!(doc.database(), "news");

        let json = document_to_json(&doc);
        assert_eq!(json["_id"], "a");
        assert_eq!(json["tags"], json!(["x", "y"]));

        let again = document_from_json("other", json).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_malformed_json_is_conversion_error() {
        let err = document_from_str("news", "{not json").unwrap_err();
        assert!(matches!(err, QuarryError::Conversion { .. }));

        let err = document_from_json("news", json!([1, 2])).unwrap_err();
        assert!(matches!(err, QuarryError::Conversion { .. }));
    }
}
