//! Score decay over document age.
//!
//! A document indexed `age` days ago, with `age < max_days`, gets its score
//! multiplied by `1 + multiplier * (max_days - age) / max_days`. Older
//! documents, and documents without a readable index date, keep their score.

use chrono::NaiveDate;

use crate::index::record::{INDEX_DATE_FIELD, INDEX_DATE_FORMAT};
use crate::index::{DocNumber, IndexReader};

/// Precomputed boost per age in days.
#[derive(Debug, Clone, PartialEq)]
pub struct RecencyBoost {
    today: NaiveDate,
    max_days: u32,
    multiplier: f32,
    table: Vec<f32>,
}

impl RecencyBoost {
    /// Boost table for a window of `max_days`, clamped to `max_allowed_days`.
    pub fn new(today: NaiveDate, max_days: u32, multiplier: f32, max_allowed_days: u32) -> Self {
        let max_days = max_days.min(max_allowed_days);
        let table = (0..max_days)
            .map(|age| multiplier * (max_days - age) as f32 / max_days as f32)
            .collect();
        RecencyBoost {
            today,
            max_days,
            multiplier,
            table,
        }
    }

    /// Window after clamping.
    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    /// Configured multiplier.
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Additive boost for an age in days; 0 outside the window.
    pub fn boost_for_age(&self, age_days: i64) -> f32 {
        if age_days < 0 {
            // stamped in the future: treat as fresh
            return self.table.first().copied().unwrap_or(0.0);
        }
        usize::try_from(age_days)
            .ok()
            .and_then(|age| self.table.get(age))
            .copied()
            .unwrap_or(0.0)
    }

    /// Age of a document in days from its index date.
    pub fn age_of(&self, reader: &IndexReader, doc: DocNumber) -> Option<i64> {
        let stamp = reader.sort_value(doc, INDEX_DATE_FIELD)?;
        let date = NaiveDate::parse_from_str(stamp, INDEX_DATE_FORMAT).ok()?;
        Some((self.today - date).num_days())
    }

    /// Score multiplier of one document.
    pub fn factor(&self, reader: &IndexReader, doc: DocNumber) -> f32 {
        1.0 + self
            .age_of(reader, doc)
            .map(|age| self.boost_for_age(age))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_linear_decay() {
        let boost = RecencyBoost::new(today(), 10, 2.0, 730);
        assert_eq!(boost.boost_for_age(0), 2.0);
        assert!((boost.boost_for_age(5) - 1.0).abs() < 1e-6);
        assert!((boost.boost_for_age(9) - 0.2).abs() < 1e-6);
        assert_eq!(boost.boost_for_age(10), 0.0);
        assert_eq!(boost.boost_for_age(400), 0.0);
    }

    #[test]
    fn test_window_is_clamped() {
        let boost = RecencyBoost::new(today(), 10_000, 1.0, 730);
        assert_eq!(boost.max_days(), 730);
        assert_eq!(boost.boost_for_age(730), 0.0);
        assert!(boost.boost_for_age(729) > 0.0);
    }

    #[test]
    fn test_zero_window_never_boosts() {
        let boost = RecencyBoost::new(today(), 0, 3.0, 730);
        assert_eq!(boost.boost_for_age(0), 0.0);
    }
}
