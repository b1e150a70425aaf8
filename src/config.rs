//! Runtime configuration.
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! file, then `QUARRY_*` environment variables.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};

/// Default number of cached index handles.
pub const DEFAULT_CACHE_CAPACITY: usize = 24;

/// Default upper bound for recency windows, in days.
pub const DEFAULT_MAX_RECENCY_DAYS: u32 = 730;

/// Configuration shared by the indexer, the query executor and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Root directory holding one sub-directory per named index.
    pub index_root: PathBuf,

    /// Root directory of the JSON-file configuration repository.
    pub config_root: PathBuf,

    /// Maximum number of opened index handles kept in the cache.
    pub cache_capacity: usize,

    /// Recency windows longer than this are clamped.
    pub max_recency_days: u32,

    /// Worker threads used by the pooled index writer.
    pub writer_threads: usize,

    /// Capacity of the pooled writer task queue.
    pub writer_queue_capacity: usize,

    /// Analyzer used when a policy does not name one.
    pub default_analyzer: String,

    /// Page size used when the caller asks for zero results.
    pub default_limit: usize,

    /// Edit distance used by fuzzy fallback and lookups.
    pub fuzzy_max_edits: u32,

    /// Keyword substitutions applied while sanitizing search input.
    pub synonyms: HashMap<String, String>,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        let mut synonyms = HashMap::new();
        synonyms.insert("&".to_string(), "and".to_string());

        QuarryConfig {
            index_root: PathBuf::from("./data/index"),
            config_root: PathBuf::from("./data/config"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_recency_days: DEFAULT_MAX_RECENCY_DAYS,
            writer_threads: num_cpus::get(),
            writer_queue_capacity: 1000,
            default_analyzer: "standard".to_string(),
            default_limit: 10,
            fuzzy_max_edits: 2,
            synonyms,
        }
    }
}

impl QuarryConfig {
    /// Load a configuration file, falling back to defaults for missing keys.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: QuarryConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUARRY_*` overrides using the given variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("QUARRY_INDEX_ROOT") {
            self.index_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("QUARRY_CONFIG_ROOT") {
            self.config_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("QUARRY_CACHE_CAPACITY") {
            self.cache_capacity = parse_env("QUARRY_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("QUARRY_MAX_RECENCY_DAYS") {
            self.max_recency_days = parse_env("QUARRY_MAX_RECENCY_DAYS", &value)?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(QuarryError::config("cache_capacity must be positive"));
        }
        if self.writer_threads == 0 {
            return Err(QuarryError::config("writer_threads must be positive"));
        }
        if self.writer_queue_capacity == 0 {
            return Err(QuarryError::config("writer_queue_capacity must be positive"));
        }
        if self.max_recency_days == 0 {
            return Err(QuarryError::config("max_recency_days must be positive"));
        }
        if self.default_analyzer.trim().is_empty() {
            return Err(QuarryError::config("default_analyzer is required"));
        }
        Ok(())
    }

    /// Directory of a named index.
    pub fn index_location(&self, index_name: &str) -> PathBuf {
        self.index_root.join(index_name)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QuarryError::config(format!("{key} has an invalid value: {value}")))
}
