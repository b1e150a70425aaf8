//! Shared helpers.

pub mod levenshtein;
