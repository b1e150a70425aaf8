//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::args::{OutputFormat, QuarryArgs};
use crate::document::document_to_json;
use crate::error::Result;
use crate::index::CacheStats;
use crate::search::{ExplainedHit, RankedTerm, SearchResults};

/// Result structure for indexing.
#[derive(Debug, Serialize)]
pub struct IndexingReport {
    pub index: String,
    pub database: String,
    pub documents_read: usize,
    pub indexed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Result structure for lookups.
#[derive(Debug, Serialize)]
pub struct LookupValues {
    pub keywords: String,
    pub values: Vec<String>,
}

/// Values the CLI knows how to print for people.
pub trait HumanOutput {
    fn render(&self) -> String;
}

impl HumanOutput for IndexingReport {
    fn render(&self) -> String {
        format!(
            "Indexed {} of {} documents from {} into {} in {} ms ({} failed)\n",
            self.indexed, self.documents_read, self.database, self.index, self.duration_ms, self.failed
        )
    }
}

impl HumanOutput for SearchResults {
    fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Search Results: {} total", self.total_hits);
        let _ = writeln!(out, "═══════════════");
        for (i, hit) in self.hits.iter().enumerate() {
            let _ = writeln!(
                out,
                "\n{}. {}/{} (Score: {:.3})",
                i + 1,
                hit.document.database(),
                hit.id().unwrap_or("-"),
                hit.score
            );
            for (name, value) in hit.document.attributes().iter() {
                let _ = writeln!(out, "   {name}: {value}");
            }
        }
        if !self.suggestions.is_empty() {
            let words: Vec<&str> = self.suggestions.iter().map(|s| s.word.as_str()).collect();
            let _ = writeln!(out, "\nDid you mean: {}", words.join(", "));
        }
        out
    }
}

impl HumanOutput for LookupValues {
    fn render(&self) -> String {
        if self.values.is_empty() {
            return format!("No values for '{}'\n", self.keywords);
        }
        self.values.iter().map(|v| format!("{v}\n")).collect()
    }
}

impl HumanOutput for Vec<ExplainedHit> {
    fn render(&self) -> String {
        let mut out = String::new();
        for hit in self {
            let _ = writeln!(
                out,
                "{}/{} (Score: {:.3})",
                hit.hit.document.database(),
                hit.hit.id().unwrap_or("-"),
                hit.hit.score
            );
            let _ = writeln!(out, "{}", hit.explanation);
        }
        out
    }
}

impl HumanOutput for Vec<RankedTerm> {
    fn render(&self) -> String {
        let width = self.iter().map(|t| t.name.len() + t.value.len() + 1).max().unwrap_or(0);
        self.iter()
            .map(|t| format!("{:<width$}  {}\n", format!("{}:{}", t.name, t.value), t.frequency))
            .collect()
    }
}

impl HumanOutput for CacheStats {
    fn render(&self) -> String {
        format!(
            "Cached readers: {}/{}\nHits: {}\nMisses: {}\nEvictions: {}\n",
            self.size, self.capacity, self.hits, self.misses, self.evictions
        )
    }
}

/// JSON form of search results with flattened documents.
pub fn search_results_json(results: &SearchResults) -> serde_json::Value {
    serde_json::json!({
        "totalHits": results.total_hits,
        "maxScore": results.max_score,
        "hits": results.hits.iter().map(|hit| {
            let mut document = document_to_json(&hit.document);
            if let Some(object) = document.as_object_mut() {
                object.insert("_score".to_string(), serde_json::json!(hit.score));
            }
            document
        }).collect::<Vec<_>>(),
        "suggestions": results.suggestions,
    })
}

/// Print a result in the selected format.
pub fn output_result<T: Serialize + HumanOutput>(result: &T, args: &QuarryArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                print!("{}", result.render());
            }
            Ok(())
        }
        OutputFormat::Json => output_json(&serde_json::to_value(result)?, args),
    }
}

/// Print a JSON value.
pub fn output_json(value: &serde_json::Value, args: &QuarryArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_terms_aligned() {
        let terms = vec![
            RankedTerm {
                name: "title".to_string(),
                value: "rust".to_string(),
                frequency: 12,
            },
            RankedTerm {
                name: "tag".to_string(),
                value: "systems".to_string(),
                frequency: 3,
            },
        ];
        assert_eq!(terms.render(), "title:rust   12\ntag:systems  3\n");
    }

    #[test]
    fn test_empty_lookup() {
        let values = LookupValues {
            keywords: "zz".to_string(),
            values: Vec::new(),
        };
        assert_eq!(values.render(), "No values for 'zz'\n");
    }
}
