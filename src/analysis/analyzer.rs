//! Analyzers turning field text into index terms.
//!
//! ```text
//! Raw Text → Tokenizer → Lowercase → Stop words → Terms
//! ```
//!
//! | Analyzer   | Tokenizer              | Filters             |
//! |------------|------------------------|---------------------|
//! | standard   | Unicode word bounds    | lowercase, stop     |
//! | simple     | Unicode word bounds    | lowercase           |
//! | whitespace | whitespace             | none                |
//! | keyword    | whole input, one token | none                |

use std::collections::HashSet;
use std::sync::LazyLock;

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Default English stop words.
const DEFAULT_ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

static STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| DEFAULT_ENGLISH_STOP_WORDS.iter().copied().collect());

/// Trait for analyzers that convert text into processed tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze the given text.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Name the analyzer is registered under.
    fn name(&self) -> &'static str;

    /// Convenience: analyzed term texts only.
    fn terms(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.analyze(text)?.map(|t| t.text).collect())
    }
}

/// Split on Unicode word boundaries, keeping segments with alphanumerics.
fn unicode_words(text: &str) -> Vec<Token> {
    text.split_word_bound_indices()
        .filter(|(_, word)| word.chars().any(char::is_alphanumeric))
        .enumerate()
        .map(|(position, (offset, word))| {
            Token::with_offsets(word, position, offset, offset + word.len())
        })
        .collect()
}

/// Word tokenizer with lowercase and English stop word filtering.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    stop_words: bool,
}

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        StandardAnalyzer { stop_words: true }
    }

    /// Create a standard analyzer that keeps stop words.
    pub fn without_stop_words() -> Self {
        StandardAnalyzer { stop_words: false }
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let stop_words = self.stop_words;
        let tokens: Vec<Token> = unicode_words(text)
            .into_iter()
            .map(|t| {
                let lower = t.text.to_lowercase();
                t.with_text(lower)
            })
            .filter(|t| !stop_words || !STOP_WORDS.contains(t.text.as_str()))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Word tokenizer with lowercase only.
#[derive(Debug, Clone, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    /// Create a new simple analyzer.
    pub fn new() -> Self {
        SimpleAnalyzer
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = unicode_words(text)
            .into_iter()
            .map(|t| {
                let lower = t.text.to_lowercase();
                t.with_text(lower)
            })
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Splits on whitespace and leaves case untouched.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceAnalyzer;

impl WhitespaceAnalyzer {
    /// Create a new whitespace analyzer.
    pub fn new() -> Self {
        WhitespaceAnalyzer
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let base = text.as_ptr() as usize;
        let tokens: Vec<Token> = text
            .split_whitespace()
            .enumerate()
            .map(|(position, word)| {
                let start = word.as_ptr() as usize - base;
                Token::with_offsets(word, position, start, start + word.len())
            })
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Treats the whole trimmed input as one token.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    /// Create a new keyword analyzer.
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        Ok(Box::new(std::iter::once(Token::new(trimmed, 0))))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
