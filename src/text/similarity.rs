//! String similarity primitives: Jaccard, Levenshtein, and name patterns.
//!
//! These feed the entity similarity engine. All functions return scores in
//! `[0, 1]` and are symmetric in their arguments.

use std::collections::HashSet;

use super::tokenize;

/// Jaccard similarity over two term sets.
///
/// `jaccard(A, A) = 1`, `jaccard(A, ∅) = 0`, symmetric.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Levenshtein edit distance between two strings, by character.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row DP
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Levenshtein distance normalised to a `[0, 1]` similarity.
///
/// Two empty strings are identical (1.0).
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Sentence-level similarity: the stronger of character-edit similarity and
/// a damped Jaccard over meaningful words.
pub fn sentence_similarity(a: &str, b: &str) -> f64 {
    let edit = levenshtein_similarity(&a.to_lowercase(), &b.to_lowercase());
    let word = jaccard(&tokenize(a), &tokenize(b)) * 0.8;
    edit.max(word)
}

/// Name-pattern score: shared words weigh 0.25 each, matching first or last
/// words add 0.1 each. Clamped to 1.
pub fn name_pattern_score(a: &str, b: &str) -> f64 {
    let words_a: Vec<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let words_b: Vec<String> = b.to_lowercase().split_whitespace().map(String::from).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let set_b: HashSet<&str> = words_b.iter().map(String::as_str).collect();
    let shared = words_a
        .iter()
        .collect::<HashSet<_>>()
        .iter()
        .filter(|w| set_b.contains(w.as_str()))
        .count();

    let mut score = shared as f64 * 0.25;
    if words_a.first() == words_b.first() {
        score += 0.1;
    }
    if words_a.last() == words_b.last() {
        score += 0.1;
    }
    score.min(1.0)
}
