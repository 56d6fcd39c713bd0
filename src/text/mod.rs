//! Text analysis — tokenization, keyword extraction, compression, and
//! string similarity primitives.
//!
//! Everything in this module is pure CPU: no I/O, no database access, and
//! deterministic output for a given input. The same routines run at ingest
//! (compressing observations, deriving keywords) and at query time
//! (normalizing search terms).

pub mod keywords;
pub mod optimize;
pub mod similarity;

/// English stop words dropped by [`tokenize`] and the search term pipeline.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "have", "has", "had", "will", "would", "can", "that", "this",
    "it", "its", "as", "be", "from", "he", "during", "including",
];

/// Returns `true` if `word` (already lowercased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Tokenize text into meaningful lowercase terms.
///
/// Splits on runs of non-letter characters, drops terms of length ≤ 2, and
/// filters stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| t.len() > 2 && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Lightweight Porter-style stemmer.
///
/// Strips common English suffixes in longest-first order. Deterministic and
/// intentionally conservative — short terms pass through unchanged.
pub fn stem(term: &str) -> String {
    let t = term.to_lowercase();

    if let Some(base) = t.strip_suffix("sses") {
        return format!("{base}ss");
    }
    if let Some(base) = t.strip_suffix("ies") {
        return format!("{base}i");
    }
    if t.ends_with("ss") {
        return t;
    }
    if t.len() > 6 {
        if let Some(base) = t.strip_suffix("ation") {
            return format!("{base}ate");
        }
        if let Some(base) = t.strip_suffix("ness") {
            return base.to_string();
        }
        if let Some(base) = t.strip_suffix("ment") {
            return base.to_string();
        }
    }
    if t.len() > 5 {
        if let Some(base) = t.strip_suffix("ing") {
            return base.to_string();
        }
        if let Some(base) = t.strip_suffix("edly") {
            return base.to_string();
        }
    }
    if t.len() > 4 {
        if let Some(base) = t.strip_suffix("ed") {
            return base.to_string();
        }
        if let Some(base) = t.strip_suffix("ly") {
            return base.to_string();
        }
    }
    if t.len() > 3 {
        if let Some(base) = t.strip_suffix('s') {
            return base.to_string();
        }
    }
    t
}
