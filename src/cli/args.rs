//! Command line argument parsing for the Quarry CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Quarry - policy-driven document indexing and search
#[derive(Parser, Debug, Clone)]
#[command(name = "quarry")]
#[command(about = "Policy-driven document indexing and search")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct QuarryArgs {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Configuration file (JSON)
    #[arg(short, long, value_name = "FILE", env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl QuarryArgs {
    /// Effective verbosity: 0 quiet, 1 normal, more for each `-v`.
    pub fn verbosity(&self) -> u8 {
        if self.quiet { 0 } else { self.verbose + 1 }
    }

    /// Log level matching the verbosity.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity() {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index a JSON-lines file of documents
    Index(IndexArgs),

    /// Search an index
    Search(SearchArgs),

    /// Autocomplete partially typed keywords
    Lookup(LookupArgs),

    /// Find documents similar to an indexed one
    #[command(name = "more-like-this")]
    MoreLikeThis(MoreLikeThisArgs),

    /// Show how search hits were scored
    Explain(ExplainArgs),

    /// List the most frequent terms of an index
    #[command(name = "top-terms")]
    TopTerms(TopTermsArgs),

    /// Open indexes and show reader cache counters
    #[command(name = "cache-stats")]
    CacheStats(CacheStatsArgs),
}

/// Arguments for indexing documents
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Index policy file (JSON)
    #[arg(value_name = "POLICY_FILE")]
    pub policy_file: PathBuf,

    /// Document file, one JSON object per line
    #[arg(value_name = "DOCS_JSONL")]
    pub document_file: PathBuf,

    /// Name of the index
    #[arg(short, long)]
    pub index: String,

    /// Database documents without `_database` belong to
    #[arg(short, long)]
    pub database: String,

    /// Keep records of the database that are not in the file
    #[arg(long)]
    pub keep_existing: bool,

    /// Writer threads (defaults to the configuration)
    #[arg(short, long)]
    pub threads: Option<usize>,
}

/// Criteria shared by keyword commands
#[derive(Parser, Debug, Clone)]
pub struct CriteriaArgs {
    /// Restrict results to an owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Boost documents indexed within this many days
    #[arg(long, value_name = "DAYS")]
    pub recency_days: Option<u32>,

    /// Boost of a document indexed today
    #[arg(long, default_value = "1.0")]
    pub recency_multiplier: f32,

    /// Retry with fuzzy terms when nothing matches
    #[arg(long)]
    pub fuzzy: bool,

    /// Rank by the stored score only
    #[arg(long)]
    pub score_only: bool,

    /// Sort by this field before relevance
    #[arg(long, value_name = "FIELD")]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Name of the index
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Keywords
    #[arg(value_name = "KEYWORDS", default_value = "")]
    pub keywords: String,

    /// Query policy file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub policy: PathBuf,

    /// First hit to return (1-based)
    #[arg(short, long, default_value = "1")]
    pub start: usize,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Include spelling suggestions
    #[arg(long)]
    pub suggest: bool,

    #[command(flatten)]
    pub criteria: CriteriaArgs,
}

/// Arguments for lookups
#[derive(Parser, Debug, Clone)]
pub struct LookupArgs {
    /// Name of the index
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Partially typed keywords
    #[arg(value_name = "KEYWORDS")]
    pub keywords: String,

    /// Lookup policy file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub policy: PathBuf,

    /// Maximum number of values
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Match words fuzzily when nothing matches
    #[arg(long)]
    pub fuzzy: bool,
}

/// Arguments for similarity search
#[derive(Parser, Debug, Clone)]
pub struct MoreLikeThisArgs {
    /// Name of the index
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Database of the source document
    #[arg(value_name = "DATABASE")]
    pub database: String,

    /// Id of the source document
    #[arg(value_name = "ID")]
    pub id: String,

    /// Query policy file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub policy: PathBuf,

    /// First hit to return (1-based)
    #[arg(short, long, default_value = "1")]
    pub start: usize,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}

/// Arguments for explained searches
#[derive(Parser, Debug, Clone)]
pub struct ExplainArgs {
    /// Name of the index
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Keywords
    #[arg(value_name = "KEYWORDS")]
    pub keywords: String,

    /// Query policy file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub policy: PathBuf,

    /// First hit to return (1-based)
    #[arg(short, long, default_value = "1")]
    pub start: usize,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "5")]
    pub limit: usize,

    #[command(flatten)]
    pub criteria: CriteriaArgs,
}

/// Arguments for term listings
#[derive(Parser, Debug, Clone)]
pub struct TopTermsArgs {
    /// Name of the index
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Query policy file (JSON) naming the default fields
    #[arg(short, long, value_name = "FILE")]
    pub policy: PathBuf,

    /// Fields to list (comma-separated; policy fields when absent)
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Maximum number of terms
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Arguments for cache statistics
#[derive(Parser, Debug, Clone)]
pub struct CacheStatsArgs {
    /// Indexes to open
    #[arg(value_name = "INDEX")]
    pub indexes: Vec<String>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
