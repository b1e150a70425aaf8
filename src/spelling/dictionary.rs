//! Word frequency dictionary for spelling suggestions.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::util::levenshtein::edit_distance_within;

/// A suggested replacement for a misspelled word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Dictionary word.
    pub word: String,
    /// Edit distance from the input.
    pub distance: usize,
    /// How often the word was seen while training.
    pub frequency: u32,
}

/// A dictionary that stores words and their frequencies.
///
/// Words are normalized to lowercase. Travels inside the index snapshot, so
/// it only holds plain maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellingDictionary {
    words: HashMap<String, u32>,
    total_count: u64,
}

impl SpellingDictionary {
    /// Create a new empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frequency of a word.
    pub fn add_word(&mut self, word: &str, frequency: u32) {
        let normalized = word.to_lowercase();
        let old = self.words.insert(normalized, frequency).unwrap_or(0);
        self.total_count = self.total_count - old as u64 + frequency as u64;
    }

    /// Increment the frequency of a word by 1.
    pub fn increment_word(&mut self, word: &str) {
        let current = self.frequency(word);
        self.add_word(word, current.saturating_add(1));
    }

    /// Count every word of an analyzed term stream.
    ///
    /// Terms shorter than two characters or without letters are ignored.
    pub fn train<'a, I>(&mut self, terms: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for term in terms {
            if term.chars().count() > 1 && term.chars().any(char::is_alphabetic) {
                self.increment_word(term);
            }
        }
    }

    /// Check if a word exists in the dictionary.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(&word.to_lowercase())
    }

    /// Get the frequency of a word.
    pub fn frequency(&self, word: &str) -> u32 {
        self.words.get(&word.to_lowercase()).copied().unwrap_or(0)
    }

    /// Get the total number of unique words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Get the total frequency count.
    pub fn total_frequency(&self) -> u64 {
        self.total_count
    }

    /// Whether nothing was trained yet.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Merge another dictionary into this one, summing frequencies.
    pub fn merge(&mut self, other: &SpellingDictionary) {
        for (word, frequency) in &other.words {
            let current = self.frequency(word);
            self.add_word(word, current.saturating_add(*frequency));
        }
    }

    /// Words starting with `prefix`, most frequent first.
    pub fn words_with_prefix(&self, prefix: &str, limit: usize) -> Vec<(String, u32)> {
        let prefix = prefix.to_lowercase();
        let mut matches: Vec<(String, u32)> = self
            .words
            .iter()
            .filter(|(word, _)| word.starts_with(&prefix))
            .map(|(word, freq)| (word.clone(), *freq))
            .collect();
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        matches.truncate(limit);
        matches
    }

    /// Dictionary words within `max_edits` of `word`.
    ///
    /// Closest first, then most frequent. A word already in the dictionary
    /// has no suggestions.
    pub fn suggest(&self, word: &str, max_edits: usize, limit: usize) -> Vec<Suggestion> {
        let normalized = word.to_lowercase();
        if normalized.is_empty() || self.words.contains_key(&normalized) {
            return Vec::new();
        }

        let mut suggestions: Vec<Suggestion> = self
            .words
            .iter()
            .filter_map(|(candidate, frequency)| {
                edit_distance_within(&normalized, candidate, max_edits).map(|distance| Suggestion {
                    word: candidate.clone(),
                    distance,
                    frequency: *frequency,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| match a.distance.cmp(&b.distance) {
            Ordering::Equal => b
                .frequency
                .cmp(&a.frequency)
                .then_with(|| a.word.cmp(&b.word)),
            other => other,
        });
        suggestions.truncate(limit);
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequencies() {
        let mut dict = SpellingDictionary::new();
        dict.add_word("Hello", 3);
        dict.increment_word("hello");
        dict.increment_word("world");

        assert!(dict.contains("HELLO"));
        assert_eq!(dict.frequency("hello"), 4);
        assert_eq!(dict.word_count(), 2);
        assert_eq!(dict.total_frequency(), 5);
    }

    #[test]
    fn test_train_skips_noise() {
        let mut dict = SpellingDictionary::new();
        dict.train(["search", "a", "42", "search", "engine"]);
        assert_eq!(dict.frequency("search"), 2);
        assert!(!dict.contains("a"));
        assert!(!dict.contains("42"));
    }

    #[test]
    fn test_suggest_orders_by_distance_then_frequency() {
        let mut dict = SpellingDictionary::new();
        dict.add_word("search", 10);
        dict.add_word("starch", 50);
        dict.add_word("peach", 5);

        let suggestions = dict.suggest("serch", 2, 5);
        assert_eq!(suggestions[0].word, "search");
        assert_eq!(suggestions[0].distance, 1);
        assert_eq!(suggestions[1].word, "starch");

        assert!(dict.suggest("search", 2, 5).is_empty());
    }

    #[test]
    fn test_prefix_and_merge() {
        let mut a = SpellingDictionary::new();
        a.add_word("apple", 2);
        let mut b = SpellingDictionary::new();
        b.add_word("apple", 3);
        b.add_word("apricot", 1);
        a.merge(&b);

        assert_eq!(a.frequency("apple"), 5);
        let words = a.words_with_prefix("ap", 10);
        assert_eq!(words[0], ("apple".to_string(), 5));
        assert_eq!(words.len(), 2);
    }
}
