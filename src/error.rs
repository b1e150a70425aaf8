//! Error types for the Quarry library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`QuarryError`] enum. The variants follow the failure classes a caller has
//! to tell apart:
//!
//! - configuration problems (missing parameters, malformed field paths) fail fast
//! - persistence problems carry a numeric, HTTP-like status code
//! - conversion problems wrap the original cause, since they mean corrupt data
//! - search problems wrap whatever broke while a query was executing
//!
//! # Examples
//!
//! ```
//! use quarry::error::{QuarryError, Result};
//!
//! fn lookup(name: &str) -> Result<()> {
//!     if name.trim().is_empty() {
//!         return Err(QuarryError::config("policy name is required"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(lookup("").is_err());
//! ```

use std::fmt;
use std::io;

use thiserror::Error;

/// The main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// I/O errors (index directory, configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or invalid configuration, including malformed field paths.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the index engine (writer, reader, directory).
    #[error("Index error: {0}")]
    Index(String),

    /// Keyword or query construction errors.
    #[error("Query error: {0}")]
    Query(String),

    /// Failures while executing a search against an opened index.
    #[error("Search error: {0}")]
    Search(String),

    /// Malformed stored data that could not be converted.
    #[error("Conversion error: {message}")]
    Conversion {
        /// What was being converted.
        message: String,
        /// The underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Errors reported by a document or configuration repository.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary snapshot encoding errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        QuarryError::Config(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        QuarryError::Index(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        QuarryError::Query(msg.into())
    }

    /// Create a new search error.
    pub fn search<S: Into<String>>(msg: S) -> Self {
        QuarryError::Search(msg.into())
    }

    /// Wrap a conversion failure together with its cause.
    pub fn conversion<S, E>(msg: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        QuarryError::Conversion {
            message: msg.into(),
            source: Box::new(source),
        }
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        QuarryError::Other(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuarryError::Config(format!("Invalid argument: {}", msg.into()))
    }

    /// Re-label any error raised while a search runs as a search error.
    ///
    /// Persistence and conversion errors keep their kind so callers can still
    /// map them to a status code.
    pub fn into_search_error(self) -> Self {
        match self {
            e @ (QuarryError::Search(_)
            | QuarryError::Persistence(_)
            | QuarryError::Conversion { .. }
            | QuarryError::Config(_)) => e,
            other => QuarryError::Search(other.to_string()),
        }
    }

    /// The HTTP-like status code a service boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            QuarryError::Config(_) | QuarryError::Query(_) => 400,
            QuarryError::Persistence(e) => e.code,
            _ => 500,
        }
    }
}

/// Error reported by a persistence backend.
///
/// The numeric `code` mirrors HTTP status semantics (404 not found, 409
/// revision conflict, 500 backend failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceError {
    /// Status code of the failure.
    pub code: u16,
    /// Human readable message.
    pub message: String,
}

impl PersistenceError {
    /// Create an error with an explicit code.
    pub fn new<S: Into<String>>(code: u16, message: S) -> Self {
        PersistenceError {
            code,
            message: message.into(),
        }
    }

    /// Entity does not exist.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(404, message)
    }

    /// Revision mismatch or duplicate entity.
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(409, message)
    }

    /// Rejected input.
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(400, message)
    }

    /// Backend failure.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(500, message)
    }

    /// Whether the failure means the entity is missing.
    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Persistence error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for PersistenceError {}
