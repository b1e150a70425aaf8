//! Documents and search hits.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::value::{AttributeValue, Attributes};
use crate::error::{QuarryError, Result};

/// Attribute names must come from the word-character family.
static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\-]*$").expect("valid attribute pattern"));

/// Whether `name` may be used as an attribute key.
pub fn is_valid_attribute_name(name: &str) -> bool {
    ATTRIBUTE_NAME.is_match(name)
}

/// A semantic record stored in a database and indexed by policy.
///
/// The id is optional until a repository assigns one; the indexer rejects
/// documents that still have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    database: String,
    id: Option<String>,
    revision: Option<String>,
    attributes: Attributes,
}

impl Document {
    /// Create a builder for the given database.
    pub fn builder<S: Into<String>>(database: S) -> DocumentBuilder {
        DocumentBuilder::new(database)
    }

    /// Database (namespace) the document belongs to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Document id, unique within the database.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Optimistic-concurrency revision token.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Ordered attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Document rebuilt from stored index values. Names are kept as stored,
    /// so path expressions such as `tags[rank]` survive.
    pub(crate) fn from_stored(database: String, id: Option<String>, attributes: Attributes) -> Self {
        Document {
            database,
            id,
            revision: None,
            attributes,
        }
    }

    /// Get one attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Copy of this document carrying the given id.
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Copy of this document carrying the given revision.
    pub fn with_revision<S: Into<String>>(mut self, revision: S) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// The id, or an index error naming the database when it is missing.
    pub fn require_id(&self) -> Result<&str> {
        self.id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| QuarryError::index(format!("document in '{}' has no id", self.database)))
    }
}

/// Fluent builder for [`Document`].
///
/// Attribute names outside the allowed pattern are dropped silently.
#[derive(Debug)]
pub struct DocumentBuilder {
    database: String,
    id: Option<String>,
    revision: Option<String>,
    attributes: Attributes,
}

impl DocumentBuilder {
    /// Start a document in the given database.
    pub fn new<S: Into<String>>(database: S) -> Self {
        DocumentBuilder {
            database: database.into(),
            id: None,
            revision: None,
            attributes: Attributes::new(),
        }
    }

    /// Set the id.
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    /// Set the revision.
    pub fn revision<S: Into<String>>(mut self, revision: S) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Add an attribute; invalid names are ignored.
    pub fn attribute<S: Into<String>, V: Into<AttributeValue>>(mut self, name: S, value: V) -> Self {
        let name = name.into();
        if is_valid_attribute_name(&name) {
            self.attributes.insert(name, value.into());
        } else {
            debug!("skipping attribute with invalid name '{name}'");
        }
        self
    }

    /// Add every attribute of a map; invalid names are ignored.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        for (name, value) in attributes {
            self = self.attribute(name, value);
        }
        self
    }

    /// Build the document. The database must not be blank.
    pub fn build(self) -> Result<Document> {
        if self.database.trim().is_empty() {
            return Err(QuarryError::config("document database is required"));
        }
        Ok(Document {
            database: self.database,
            id: self.id,
            revision: self.revision,
            attributes: self.attributes,
        })
    }
}

/// A document produced by query execution.
///
/// Carries the transient relevance score and the internal document number of
/// the hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDoc {
    /// The rebuilt document.
    pub document: Document,
    /// Relevance score of the hit.
    pub score: f32,
    /// Internal document number inside the index snapshot.
    pub doc_number: u32,
}

impl SearchDoc {
    /// Synthetic attribute holding the score.
    pub const SCORE_ATTRIBUTE: &'static str = "_score";

    /// Synthetic attribute holding the internal document number.
    pub const HIT_ATTRIBUTE: &'static str = "_hit";

    /// Id of the underlying document.
    pub fn id(&self) -> Option<&str> {
        self.document.id()
    }

    /// The document attributes plus the synthetic score and hit fields.
    pub fn attributes_with_hit(&self) -> Attributes {
        let mut attributes = self.document.attributes().clone();
        attributes.insert(Self::SCORE_ATTRIBUTE, AttributeValue::Float(self.score as f64));
        attributes.insert(Self::HIT_ATTRIBUTE, AttributeValue::Integer(self.doc_number as i64));
        attributes
    }
}
