//! Policies stored as JSON files.
//!
//! ```text
//! <root>/
//! ├── index/<name>.json
//! ├── query/<name>.json
//! └── lookup/<name>.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PersistenceError, QuarryError, Result};
use crate::policy::{IndexPolicy, LookupPolicy, QueryPolicy};
use crate::repository::{ConfigurationRepository, check_name};

const INDEX_DIR: &str = "index";
const QUERY_DIR: &str = "query";
const LOOKUP_DIR: &str = "lookup";

/// Configuration repository over a directory tree of JSON files.
#[derive(Debug, Clone)]
pub struct FileConfigurationRepository {
    root: PathBuf,
}

impl FileConfigurationRepository {
    /// Repository rooted at `root`; directories are created on first save.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileConfigurationRepository {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: &str, name: &str) -> Result<PathBuf> {
        check_name(kind, name)?;
        Ok(self.root.join(kind).join(format!("{name}.json")))
    }

    fn read<P: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<P> {
        let path = self.path(kind, name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PersistenceError::not_found(format!("{kind} policy '{name}' not found")).into());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| QuarryError::conversion(format!("{kind} policy {}", path.display()), e))
    }

    fn write<P: Serialize>(&self, kind: &str, name: &str, policy: &P) -> Result<()> {
        let path = self.path(kind, name)?;
        let directory = self.root.join(kind);
        fs::create_dir_all(&directory)?;

        let json = serde_json::to_string_pretty(policy)?;
        let temp = directory.join(format!(".{name}.json.tmp"));
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;
        debug!("saved {kind} policy {}", path.display());
        Ok(())
    }
}

impl ConfigurationRepository for FileConfigurationRepository {
    fn get_index_policy(&self, name: &str) -> Result<IndexPolicy> {
        self.read(INDEX_DIR, name)
    }

    fn save_index_policy(&self, name: &str, policy: &IndexPolicy) -> Result<()> {
        policy.validate()?;
        self.write(INDEX_DIR, name, policy)
    }

    fn get_query_policy(&self, name: &str) -> Result<QueryPolicy> {
        self.read(QUERY_DIR, name)
    }

    fn save_query_policy(&self, name: &str, policy: &QueryPolicy) -> Result<()> {
        policy.validate()?;
        self.write(QUERY_DIR, name, policy)
    }

    fn get_lookup_policy(&self, name: &str) -> Result<LookupPolicy> {
        self.read(LOOKUP_DIR, name)
    }

    fn save_lookup_policy(&self, name: &str, policy: &LookupPolicy) -> Result<()> {
        policy.validate()?;
        self.write(LOOKUP_DIR, name, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FieldType, IndexField, QueryField};
    use tempfile::TempDir;

    #[test]
    fn test_policies_round_trip_through_files() {
        let dir = TempDir::new().unwrap();
        let repo = FileConfigurationRepository::new(dir.path());

        let index = IndexPolicy::new().with_field(IndexField::new("title").tokenized().with_boost(2.0));
        repo.save_index_policy("products", &index).unwrap();
        assert!(dir.path().join("index/products.json").exists());
        assert_eq!(repo.get_index_policy("products").unwrap(), index);

        let lookup = LookupPolicy::new(
            QueryPolicy::new().with_field(QueryField::new("name").sorted(1, true, FieldType::String)),
            "name",
        );
        repo.save_lookup_policy("names", &lookup).unwrap();
        assert_eq!(repo.get_lookup_policy("names").unwrap(), lookup);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let repo = FileConfigurationRepository::new(dir.path());
        assert_eq!(repo.get_query_policy("absent").unwrap_err().status_code(), 404);

        fs::create_dir_all(dir.path().join("query")).unwrap();
        fs::write(dir.path().join("query/broken.json"), "{ not json").unwrap();
        assert!(matches!(
            repo.get_query_policy("broken").unwrap_err(),
            QuarryError::Conversion { .. }
        ));
        assert_eq!(repo.get_query_policy("../x").unwrap_err().status_code(), 400);
    }
}
