//! Edit distance used by fuzzy queries and spelling suggestions.

use std::cmp::min;

/// Minimum number of single-character insertions, deletions or
/// substitutions turning `s1` into `s2`.
pub fn edit_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = min(min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Edit distance bounded by `max_edits`.
///
/// Returns `None` as soon as every cell of a row exceeds the bound, which
/// keeps term dictionary scans cheap.
pub fn edit_distance_within(s1: &str, s2: &str, max_edits: usize) -> Option<usize> {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.len().abs_diff(b.len()) > max_edits {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = min(min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
            row_min = min(row_min, curr[j + 1]);
        }
        if row_min > max_edits {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max_edits).then_some(distance)
}

/// Number of leading characters two strings share.
pub fn common_prefix_chars(s1: &str, s2: &str) -> usize {
    s1.chars().zip(s2.chars()).take_while(|(a, b)| a == b).count()
}
