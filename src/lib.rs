//! # Quarry
//!
//! Policy-driven document indexing and search.
//!
//! Documents are schemaless attribute maps stored in a document repository.
//! Index policies decide how their values become index fields, query and
//! lookup policies decide how keywords are matched and hits are ranked.
//!
//! ## Features
//!
//! - BM25 scoring with boosts, word order, recency and geo distance
//! - Owner, date range and location filters
//! - Autocomplete lookups with spelling suggestions
//! - More-like-this and scoring explanations
//! - In-memory or on-disk indexes with a shared reader cache

pub mod analysis;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod policy;
pub mod repository;
pub mod search;
pub mod service;
pub mod spelling;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
