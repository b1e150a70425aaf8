//! In-memory repositories.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::document::Document;
use crate::error::{PersistenceError, Result};
use crate::policy::{IndexPolicy, LookupPolicy, QueryPolicy};
use crate::repository::{ConfigurationRepository, DocumentRepository, check_name};

/// Next revision token: `<n>-<uuid>` with `n` one past the previous.
fn next_revision(previous: Option<&str>) -> String {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

/// Documents kept in ordered maps, one per database.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    databases: RwLock<BTreeMap<String, BTreeMap<String, Document>>>,
}

impl InMemoryDocumentRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a database.
    pub fn len(&self, database: &str) -> usize {
        self.databases.read().get(database).map_or(0, BTreeMap::len)
    }

    fn missing_database(database: &str) -> PersistenceError {
        PersistenceError::not_found(format!("database '{database}' does not exist"))
    }
}

impl DocumentRepository for InMemoryDocumentRepository {
    fn get_document(&self, database: &str, id: &str) -> Result<Document> {
        let databases = self.databases.read();
        let documents = databases
            .get(database)
            .ok_or_else(|| Self::missing_database(database))?;
        documents.get(id).cloned().ok_or_else(|| {
            PersistenceError::not_found(format!("document '{id}' not found in '{database}'")).into()
        })
    }

    fn save_document(&self, document: Document, overwrite: bool) -> Result<Document> {
        check_name("database", document.database())?;
        let id = match document.id() {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };

        let mut databases = self.databases.write();
        let documents = databases.entry(document.database().to_string()).or_default();
        let previous = documents.get(&id).and_then(|d| d.revision().map(str::to_string));
        if documents.contains_key(&id) && !overwrite && previous.as_deref() != document.revision() {
            return Err(PersistenceError::conflict(format!(
                "document '{id}' in '{}' has revision {:?}, not {:?}",
                document.database(),
                previous,
                document.revision()
            ))
            .into());
        }

        let revision = next_revision(previous.as_deref());
        let saved = document.with_id(id.as_str()).with_revision(revision);
        documents.insert(id, saved.clone());
        debug!("saved {}/{:?} at {:?}", saved.database(), saved.id(), saved.revision());
        Ok(saved)
    }

    fn get_all_documents(&self, database: &str, start: usize, limit: usize) -> Result<Vec<Document>> {
        let databases = self.databases.read();
        let documents = databases
            .get(database)
            .ok_or_else(|| Self::missing_database(database))?;
        Ok(documents.values().skip(start).take(limit).cloned().collect())
    }

    fn query(&self, database: &str, criteria: &HashMap<String, String>) -> Result<Vec<Document>> {
        let databases = self.databases.read();
        let documents = databases
            .get(database)
            .ok_or_else(|| Self::missing_database(database))?;
        Ok(documents
            .values()
            .filter(|doc| {
                criteria.iter().all(|(name, expected)| {
                    doc.attribute(name).is_some_and(|value| value.to_text() == *expected)
                })
            })
            .cloned()
            .collect())
    }

    fn delete_document(&self, database: &str, id: &str, revision: &str) -> Result<()> {
        let mut databases = self.databases.write();
        let documents = databases
            .get_mut(database)
            .ok_or_else(|| Self::missing_database(database))?;
        let current = documents
            .get(id)
            .ok_or_else(|| PersistenceError::not_found(format!("document '{id}' not found in '{database}'")))?;
        if current.revision() != Some(revision) {
            return Err(PersistenceError::conflict(format!(
                "document '{id}' is at revision {:?}, not {revision}",
                current.revision()
            ))
            .into());
        }
        documents.remove(id);
        Ok(())
    }

    fn get_all_databases(&self) -> Result<Vec<String>> {
        Ok(self.databases.read().keys().cloned().collect())
    }

    fn create_database(&self, database: &str) -> Result<bool> {
        check_name("database", database)?;
        let mut databases = self.databases.write();
        if databases.contains_key(database) {
            return Ok(false);
        }
        databases.insert(database.to_string(), BTreeMap::new());
        Ok(true)
    }
}

/// Policies kept in maps keyed by name.
#[derive(Debug, Default)]
pub struct InMemoryConfigurationRepository {
    index: RwLock<HashMap<String, IndexPolicy>>,
    query: RwLock<HashMap<String, QueryPolicy>>,
    lookup: RwLock<HashMap<String, LookupPolicy>>,
}

impl InMemoryConfigurationRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

fn get_policy<P: Clone>(policies: &RwLock<HashMap<String, P>>, kind: &str, name: &str) -> Result<P> {
    policies
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| PersistenceError::not_found(format!("{kind} policy '{name}' not found")).into())
}

impl ConfigurationRepository for InMemoryConfigurationRepository {
    fn get_index_policy(&self, name: &str) -> Result<IndexPolicy> {
        get_policy(&self.index, "index", name)
    }

    fn save_index_policy(&self, name: &str, policy: &IndexPolicy) -> Result<()> {
        check_name("index policy", name)?;
        policy.validate()?;
        self.index.write().insert(name.to_string(), policy.clone());
        Ok(())
    }

    fn get_query_policy(&self, name: &str) -> Result<QueryPolicy> {
        get_policy(&self.query, "query", name)
    }

    fn save_query_policy(&self, name: &str, policy: &QueryPolicy) -> Result<()> {
        check_name("query policy", name)?;
        policy.validate()?;
        self.query.write().insert(name.to_string(), policy.clone());
        Ok(())
    }

    fn get_lookup_policy(&self, name: &str) -> Result<LookupPolicy> {
        get_policy(&self.lookup, "lookup", name)
    }

    fn save_lookup_policy(&self, name: &str, policy: &LookupPolicy) -> Result<()> {
        check_name("lookup policy", name)?;
        policy.validate()?;
        self.lookup.write().insert(name.to_string(), policy.clone());
        Ok(())
    }
}
