//! Declarative field policies.
//!
//! - [`IndexPolicy`] decides how document values turn into index fields.
//! - [`QueryPolicy`] decides which fields keyword searches hit and how hits sort.
//! - [`LookupPolicy`] extends a query policy for autocomplete lookups.
//!
//! Policies are read-mostly: they are replaced wholesale through a
//! configuration repository and never patched by the engine.

pub mod index_policy;
pub mod query_policy;

pub use index_policy::{IndexField, IndexPolicy};
pub use query_policy::{FieldType, LookupPolicy, QueryField, QueryPolicy};

/// Index field names written by the engine itself.
pub const RESERVED_FIELDS: &[&str] = &[
    crate::index::record::DATABASE_FIELD,
    crate::index::record::ID_FIELD,
    crate::index::record::KEY_FIELD,
    crate::index::record::INDEX_DATE_FIELD,
    crate::index::record::SCORE_FIELD,
    crate::index::record::OWNER_FIELD,
    crate::index::record::SORT_FIELD,
    crate::index::record::LATITUDE_FIELD,
    crate::index::record::LONGITUDE_FIELD,
];

/// A policy entry keyed by name.
pub(crate) trait NamedField {
    fn name(&self) -> &str;
}

/// Insert fields keeping first-seen order; a repeated name replaces the value.
pub(crate) fn upsert_all<F, I>(fields: &mut Vec<F>, incoming: I)
where
    F: NamedField,
    I: IntoIterator<Item = F>,
{
    for field in incoming {
        match fields.iter().position(|f| f.name() == field.name()) {
            Some(position) => fields[position] = field,
            None => fields.push(field),
        }
    }
}
