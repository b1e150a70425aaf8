//! In-process inverted index.
//!
//! ```text
//! Document ─▶ Indexer ─▶ IndexRecord ─▶ IndexWriter ─▶ Directory (snapshot)
//!                                                          │
//!                          IndexCache ◀── IndexReader ◀────┘
//! ```

pub mod cache;
pub mod directory;
pub mod indexer;
pub mod pooled;
pub mod reader;
pub mod record;
pub mod snapshot;
pub mod writer;

pub use cache::{CacheStats, IndexCache};
pub use directory::{Directory, FsDirectory, RamDirectory};
pub use indexer::{IndexOutcome, Indexer};
pub use pooled::{PoolStats, PooledIndexWriter};
pub use reader::IndexReader;
pub use record::{IndexRecord, IndexableField};
pub use snapshot::{DocNumber, IndexSnapshot};
pub use writer::{IndexWriter, PreparedRecord, WriterStats};
