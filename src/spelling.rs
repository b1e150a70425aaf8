//! Spelling suggestions trained from indexed text.

pub mod dictionary;

pub use dictionary::{SpellingDictionary, Suggestion};
