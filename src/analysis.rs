//! Text analysis: tokenizers, analyzers and markup stripping.

pub mod analyzer;
pub mod html;
pub mod registry;
pub mod token;

pub use analyzer::{Analyzer, KeywordAnalyzer, SimpleAnalyzer, StandardAnalyzer, WhitespaceAnalyzer};
pub use registry::AnalyzerRegistry;
pub use token::{Token, TokenStream};
