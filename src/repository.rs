//! Document and configuration persistence.
//!
//! The engine consumes two collaborators: a [`DocumentRepository`] holding
//! the source documents, and a [`ConfigurationRepository`] holding named
//! policies. Both report failures as [`PersistenceError`]s carrying an
//! HTTP-like status code, so a missing entity (404) is distinguishable from
//! a revision conflict (409) or a backend failure (500).
//!
//! [`PersistenceError`]: crate::error::PersistenceError

pub mod file;
pub mod memory;

pub use file::FileConfigurationRepository;
pub use memory::{InMemoryConfigurationRepository, InMemoryDocumentRepository};

use std::collections::HashMap;

use crate::document::Document;
use crate::error::Result;
use crate::policy::{IndexPolicy, LookupPolicy, QueryPolicy};

/// Store of source documents grouped by database.
pub trait DocumentRepository: Send + Sync + std::fmt::Debug {
    /// One document; 404 when the database or the document is missing.
    fn get_document(&self, database: &str, id: &str) -> Result<Document>;

    /// Insert or update a document and return it with its id and new
    /// revision.
    ///
    /// Documents without an id get a generated one. Updating requires the
    /// revision of the stored document unless `overwrite` is set; a stale
    /// revision is a 409 conflict.
    fn save_document(&self, document: Document, overwrite: bool) -> Result<Document>;

    /// Documents of a database ordered by id, skipping the first `start`.
    fn get_all_documents(&self, database: &str, start: usize, limit: usize) -> Result<Vec<Document>>;

    /// Documents whose attributes render equal to every criteria value.
    fn query(&self, database: &str, criteria: &HashMap<String, String>) -> Result<Vec<Document>>;

    /// Remove a document at the given revision.
    fn delete_document(&self, database: &str, id: &str, revision: &str) -> Result<()>;

    /// Names of all databases, sorted.
    fn get_all_databases(&self) -> Result<Vec<String>>;

    /// Create a database; false when it already exists.
    fn create_database(&self, database: &str) -> Result<bool>;
}

/// Store of named policies.
pub trait ConfigurationRepository: Send + Sync + std::fmt::Debug {
    fn get_index_policy(&self, name: &str) -> Result<IndexPolicy>;
    fn save_index_policy(&self, name: &str, policy: &IndexPolicy) -> Result<()>;
    fn get_query_policy(&self, name: &str) -> Result<QueryPolicy>;
    fn save_query_policy(&self, name: &str, policy: &QueryPolicy) -> Result<()>;
    fn get_lookup_policy(&self, name: &str) -> Result<LookupPolicy>;
    fn save_lookup_policy(&self, name: &str, policy: &LookupPolicy) -> Result<()>;
}

/// Reject names that are blank or could escape a namespace directory.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(crate::error::PersistenceError::bad_request(format!("invalid {kind} name '{name}'")).into());
    }
    Ok(())
}
