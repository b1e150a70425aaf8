//! Command implementations for the Quarry CLI.
//!
//! Each command builds a [`SearchService`] over on-disk indexes. Policies
//! come from the JSON files named on the command line and are registered
//! under one fixed name for the lifetime of the command.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use log::{info, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::QuarryConfig;
use crate::document::document_from_str;
use crate::error::Result;
use crate::policy::{IndexPolicy, LookupPolicy, QueryPolicy};
use crate::repository::{
    ConfigurationRepository, DocumentRepository, InMemoryConfigurationRepository,
    InMemoryDocumentRepository,
};
use crate::search::criteria::keys;
use crate::search::SimilarTo;
use crate::service::{IndexStorage, SearchService};

/// Name policies loaded from files are registered under.
const CLI_POLICY: &str = "cli";

/// Execute a CLI command.
pub fn execute_command(args: QuarryArgs) -> Result<()> {
    let config = QuarryConfig::load(args.config.as_deref())?;
    match &args.command {
        Command::Index(index_args) => index_documents(index_args, config, &args),
        Command::Search(search_args) => search_index(search_args, config, &args),
        Command::Lookup(lookup_args) => lookup(lookup_args, config, &args),
        Command::MoreLikeThis(mlt_args) => more_like_this(mlt_args, config, &args),
        Command::Explain(explain_args) => explain(explain_args, config, &args),
        Command::TopTerms(terms_args) => top_terms(terms_args, config, &args),
        Command::CacheStats(stats_args) => cache_stats(stats_args, config, &args),
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn service(config: QuarryConfig, configuration: InMemoryConfigurationRepository) -> Result<SearchService> {
    SearchService::new(
        config,
        IndexStorage::Disk,
        Arc::new(InMemoryDocumentRepository::new()),
        Arc::new(configuration),
    )
}

fn query_service(config: QuarryConfig, policy_file: &Path) -> Result<SearchService> {
    let configuration = InMemoryConfigurationRepository::new();
    configuration.save_query_policy(CLI_POLICY, &QueryPolicy::from_json(read_json(policy_file)?)?)?;
    service(config, configuration)
}

fn criteria_options(keywords: &str, criteria: &CriteriaArgs) -> HashMap<String, String> {
    let mut options = HashMap::new();
    options.insert(keys::KEYWORDS.to_string(), keywords.to_string());
    if let Some(owner) = &criteria.owner {
        options.insert(keys::OWNER.to_string(), owner.clone());
    }
    if let Some(days) = criteria.recency_days {
        options.insert(keys::RECENCY_MAX_DAYS.to_string(), days.to_string());
        options.insert(keys::RECENCY_MULTIPLIER.to_string(), criteria.recency_multiplier.to_string());
    }
    if criteria.fuzzy {
        options.insert(keys::FUZZY.to_string(), "true".to_string());
    }
    if criteria.score_only {
        options.insert(keys::SCORE_QUERY.to_string(), "true".to_string());
    }
    if let Some(field) = &criteria.sort {
        options.insert(keys::SORT_FIELD.to_string(), field.clone());
        options.insert(keys::SORT_ASCENDING.to_string(), (!criteria.desc).to_string());
    }
    options
}

/// Index a JSON-lines document file.
fn index_documents(args: &IndexArgs, mut config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        config.writer_threads = threads.max(1);
    }
    let configuration = InMemoryConfigurationRepository::new();
    configuration.save_index_policy(CLI_POLICY, &IndexPolicy::from_json(read_json(&args.policy_file)?)?)?;
    let service = service(config, configuration)?;

    let start_time = Instant::now();
    let file = File::open(&args.document_file)
        .with_context(|| format!("opening {}", args.document_file.display()))?;
    let mut documents_read = 0;
    let mut databases = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match document_from_str(&args.database, &line) {
            Ok(document) => {
                if !databases.iter().any(|db| db == document.database()) {
                    databases.push(document.database().to_string());
                }
                service.documents().save_document(document, true)?;
                documents_read += 1;
            }
            Err(e) => warn!("skipping line {}: {e}", line_num + 1),
        }
    }
    info!("read {documents_read} documents from {}", args.document_file.display());

    let mut indexed = 0;
    let mut failed = 0;
    for database in &databases {
        let outcome = service.reindex_database(&args.index, CLI_POLICY, database, !args.keep_existing)?;
        indexed += outcome.succeeded;
        failed += outcome.failed;
    }

    output_result(
        &IndexingReport {
            index: args.index.clone(),
            database: databases.join(","),
            documents_read,
            indexed,
            failed,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn print_search(results: &crate::search::SearchResults, cli_args: &QuarryArgs) -> Result<()> {
    match cli_args.output_format {
        OutputFormat::Json => output_json(&search_results_json(results), cli_args),
        OutputFormat::Human => output_result(results, cli_args),
    }
}

/// Search an index.
fn search_index(args: &SearchArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let service = query_service(config, &args.policy)?;
    let options = criteria_options(&args.keywords, &args.criteria);
    let results = service.search(&args.index, CLI_POLICY, &options, args.suggest, args.start, args.limit)?;
    print_search(&results, cli_args)
}

/// Autocomplete against a lookup policy.
fn lookup(args: &LookupArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let configuration = InMemoryConfigurationRepository::new();
    configuration.save_lookup_policy(CLI_POLICY, &LookupPolicy::from_json(read_json(&args.policy)?)?)?;
    let service = service(config, configuration)?;

    let mut options = HashMap::new();
    options.insert(keys::KEYWORDS.to_string(), args.keywords.clone());
    if args.fuzzy {
        options.insert(keys::FUZZY.to_string(), "true".to_string());
    }
    if service.train_lookup_dictionary(&args.index, CLI_POLICY)? > 0 {
        info!("trained the dictionary of {}", args.index);
    }
    let values = service.partial_lookup(&args.index, CLI_POLICY, &options, args.limit)?;
    output_result(
        &LookupValues {
            keywords: args.keywords.clone(),
            values,
        },
        cli_args,
    )
}

/// Documents similar to an indexed one.
fn more_like_this(args: &MoreLikeThisArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let service = query_service(config, &args.policy)?;
    let source = SimilarTo::key(args.database.as_str(), args.id.as_str());
    let results = service.more_like_this(&args.index, CLI_POLICY, &source, args.start, args.limit)?;
    print_search(&results, cli_args)
}

/// Hits with scoring explanations.
fn explain(args: &ExplainArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let service = query_service(config, &args.policy)?;
    let options = criteria_options(&args.keywords, &args.criteria);
    let explained = service.explain_search(&args.index, CLI_POLICY, &options, args.start, args.limit)?;
    output_result(&explained, cli_args)
}

/// Most frequent terms.
fn top_terms(args: &TopTermsArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let service = query_service(config, &args.policy)?;
    let terms = service.top_ranking_terms(&args.index, CLI_POLICY, &args.fields, args.limit)?;
    output_result(&terms, cli_args)
}

/// Open indexes and report the reader cache.
fn cache_stats(args: &CacheStatsArgs, config: QuarryConfig, cli_args: &QuarryArgs) -> Result<()> {
    let service = service(config, InMemoryConfigurationRepository::new())?;
    for index in &args.indexes {
        let reader = service.reader(index)?;
        info!("{index}: {} documents", reader.num_docs());
    }
    // reopen to show hits
    for index in &args.indexes {
        service.reader(index)?;
    }
    output_result(&service.cache_stats(), cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_options() {
        let criteria = CriteriaArgs {
            owner: Some("alice".to_string()),
            recency_days: Some(30),
            recency_multiplier: 2.0,
            fuzzy: false,
            score_only: false,
            sort: Some("price".to_string()),
            desc: true,
        };
        let options = criteria_options("red shoes", &criteria);
        assert_eq!(options[keys::KEYWORDS], "red shoes");
        assert_eq!(options[keys::RECENCY_MULTIPLIER], "2");
        assert_eq!(options[keys::SORT_ASCENDING], "false");
        assert!(!options.contains_key(keys::FUZZY));
    }
}
