//! Document model.
//!
//! A [`Document`] is an immutable record identified by database and id, with
//! an ordered map of attribute values. [`SearchDoc`] is the read-only variant
//! produced by query execution.

#[allow(clippy::module_inception)]
pub mod document;
pub mod convert;
pub mod path;
pub mod value;

pub use convert::{document_from_json, document_from_str, document_to_json};
pub use document::{Document, DocumentBuilder, SearchDoc};
pub use path::FieldPath;
pub use value::{AttributeValue, Attributes};
