//! Named analyzer lookup.
//!
//! Components receive a registry at construction instead of reaching for a
//! process-wide table, so tests can register their own analyzers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::analyzer::{
    Analyzer, KeywordAnalyzer, SimpleAnalyzer, StandardAnalyzer, WhitespaceAnalyzer,
};
use crate::error::{QuarryError, Result};

/// Analyzers by name plus the name used when none is requested.
#[derive(Debug, Clone)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<String, Arc<dyn Analyzer>>,
    default_name: String,
}

impl AnalyzerRegistry {
    /// Registry with the built-in analyzers and `standard` as default.
    pub fn new() -> Self {
        let mut registry = AnalyzerRegistry {
            analyzers: HashMap::new(),
            default_name: "standard".to_string(),
        };
        registry.register(Arc::new(StandardAnalyzer::new()));
        registry.register(Arc::new(SimpleAnalyzer::new()));
        registry.register(Arc::new(WhitespaceAnalyzer::new()));
        registry.register(Arc::new(KeywordAnalyzer::new()));
        registry
    }

    /// Built-ins with a different default.
    pub fn with_default<S: Into<String>>(default_name: S) -> Result<Self> {
        let mut registry = Self::new();
        registry.set_default(default_name)?;
        Ok(registry)
    }

    /// Register an analyzer under its own name, replacing any previous one.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.name().to_string(), analyzer);
    }

    /// Change the default analyzer; it must already be registered.
    pub fn set_default<S: Into<String>>(&mut self, name: S) -> Result<()> {
        let name = name.into();
        if !self.analyzers.contains_key(&name) {
            return Err(QuarryError::config(format!("unknown analyzer '{name}'")));
        }
        self.default_name = name;
        Ok(())
    }

    /// Name of the default analyzer.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Look up by name; `None` selects the default.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn Analyzer>> {
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(&self.default_name);
        self.analyzers
            .get(name)
            .cloned()
            .ok_or_else(|| QuarryError::config(format!("unknown analyzer '{name}'")))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = AnalyzerRegistry::new();
        assert_eq!(registry.get(None).unwrap().name(), "standard");
        assert_eq!(registry.get(Some("keyword")).unwrap().name(), "keyword");
        assert_eq!(registry.get(Some("")).unwrap().name(), "standard");
        assert!(registry.get(Some("klingon")).is_err());
    }

    #[test]
    fn test_default_must_exist() {
        assert!(AnalyzerRegistry::with_default("simple").is_ok());
        assert!(AnalyzerRegistry::with_default("nope").is_err());
    }
}
