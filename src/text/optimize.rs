//! Content compression at three levels: minimal, balanced, aggressive.
//!
//! `minimal` only normalizes whitespace. `balanced` additionally abbreviates
//! long technical words and drops filler words that carry no signal.
//! `aggressive` strips every remaining stop and filler word and collapses
//! connective phrases into symbol shorthand. Each level is idempotent:
//! re-optimizing its own output is a no-op.

use serde::{Deserialize, Serialize};

use super::keywords::{capitalized_runs, extract_keywords, ScoredKeyword};
use super::is_stop_word;

/// Compression level applied at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Whitespace normalization only.
    Minimal,
    /// Abbreviation table plus light filler-word dropping.
    Balanced,
    /// Full stop-word removal plus connective shorthand.
    Aggressive,
}

impl std::str::FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(Self::Minimal),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(format!("unknown compression level: {s}")),
        }
    }
}

/// Result of an [`optimize`] call.
#[derive(Debug, Clone)]
pub struct Optimized {
    /// The compressed text.
    pub optimized: String,
    /// Keywords extracted from the original text.
    pub keywords: Vec<ScoredKeyword>,
    /// Capitalized name runs detected in the original text.
    pub entities: Vec<String>,
    /// Estimated token count of the compressed text.
    pub token_count: usize,
    /// Estimated token count of the original text.
    pub original_token_count: usize,
    /// `token_count / original_token_count`, 1.0 for empty input.
    pub compression_ratio: f64,
}

/// Abbreviation table for long technical words (balanced and aggressive).
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("configuration", "config"),
    ("implementation", "impl"),
    ("application", "app"),
    ("environment", "env"),
    ("development", "dev"),
    ("production", "prod"),
    ("repository", "repo"),
    ("documentation", "docs"),
    ("requirements", "reqs"),
    ("specification", "spec"),
    ("performance", "perf"),
    ("optimization", "opt"),
    ("management", "mgmt"),
    ("information", "info"),
    ("technology", "tech"),
    ("framework", "fw"),
    ("library", "lib"),
    ("service", "svc"),
    ("server", "srv"),
    ("client", "cli"),
    ("request", "req"),
    ("response", "resp"),
    ("message", "msg"),
    ("session", "sess"),
    ("transaction", "txn"),
    ("operation", "op"),
    ("process", "proc"),
    ("system", "sys"),
    ("network", "net"),
    ("security", "sec"),
    ("encryption", "enc"),
    ("validation", "val"),
];

/// Filler words dropped when they sit between unimportant neighbors.
const FILLER_WORDS: &[&str] = &[
    "very", "really", "quite", "just", "simply", "actually", "basically", "rather", "somewhat",
    "certainly", "probably", "perhaps", "maybe",
];

/// Connective words replaced with symbol shorthand at the aggressive level.
const CONNECTIVES: &[(&str, &str)] = &[
    ("is", "="),
    ("has", ">"),
    ("with", "+"),
    ("and", "&"),
    ("that", ":"),
    ("which", ":"),
];

/// Estimate token count: `ceil(len / 4)` bytes-per-token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Compress `text` at the given level and report keywords, detected names,
/// and token accounting.
pub fn optimize(text: &str, level: CompressionLevel) -> Optimized {
    let original_token_count = estimate_tokens(text.trim());

    let optimized = match level {
        CompressionLevel::Minimal => collapse_whitespace(text),
        CompressionLevel::Balanced => balanced_pass(&collapse_whitespace(text)),
        CompressionLevel::Aggressive => aggressive_pass(&balanced_pass(&collapse_whitespace(text))),
    };

    let token_count = estimate_tokens(&optimized);
    let compression_ratio = if original_token_count == 0 {
        1.0
    } else {
        token_count as f64 / original_token_count as f64
    };

    Optimized {
        keywords: extract_keywords(text, 10),
        entities: capitalized_runs(text),
        optimized,
        token_count,
        original_token_count,
        compression_ratio,
    }
}

/// Collapse internal whitespace runs to single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Balanced: abbreviate long technical words, drop isolated filler words.
fn balanced_pass(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();

    // A word is important when it carries a digit, an uppercase letter, or
    // real length; filler words never count as important neighbors.
    let important: Vec<bool> = words
        .iter()
        .map(|w| {
            let bare = w.trim_matches(|c: char| !c.is_alphanumeric());
            !is_filler(bare)
                && (bare.chars().any(|c| c.is_ascii_digit())
                    || bare.chars().any(|c| c.is_uppercase())
                    || bare.len() > 3)
        })
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
        if is_filler(bare) {
            let prev_important = i > 0 && important[i - 1];
            let next_important = i + 1 < words.len() && important[i + 1];
            if !prev_important && !next_important {
                continue;
            }
        }
        out.push(abbreviate(word));
    }
    out.join(" ")
}

/// Aggressive: symbol shorthand for connectives, then strip every remaining
/// stop and filler word.
fn aggressive_pass(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let lower = word.to_lowercase();
        if let Some((_, symbol)) = CONNECTIVES.iter().find(|(w, _)| *w == lower) {
            out.push((*symbol).to_string());
            continue;
        }
        let bare = lower.trim_matches(|c: char| !c.is_alphanumeric());
        if is_stop_word(bare) || is_filler(bare) {
            continue;
        }
        out.push(word.to_string());
    }
    out.join(" ")
}

fn is_filler(word: &str) -> bool {
    let lower = word.to_lowercase();
    FILLER_WORDS.contains(&lower.as_str())
}

/// Apply the abbreviation table to a single word, preserving trailing
/// punctuation.
fn abbreviate(word: &str) -> String {
    let trimmed = word.trim_end_matches(|c: char| !c.is_alphanumeric());
    let suffix = &word[trimmed.len()..];
    let lower = trimmed.to_lowercase();

    for (long, short) in ABBREVIATIONS {
        if lower == *long {
            return format!("{short}{suffix}");
        }
    }
    word.to_string()
}
