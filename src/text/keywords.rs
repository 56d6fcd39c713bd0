//! Keyword extraction with technical-token and pattern scoring.
//!
//! Scores are frequency-based with additive bonuses for tokens that look
//! technical (camelCase, digits) and for recognised patterns (paths, URLs,
//! scoped packages, env assignments, call sites), which weigh 3×.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::is_stop_word;

/// A term with its extraction score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKeyword {
    pub term: String,
    pub score: f64,
}

/// Weight multiplier applied to recognised pattern matches.
const PATTERN_WEIGHT: f64 = 3.0;

/// Recognised technical patterns, compiled once.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // file paths: src/memory/store.rs, ./config.toml
        Regex::new(r"\.?/?(?:[A-Za-z0-9_\-]+/)+[A-Za-z0-9_\-]+\.[A-Za-z0-9]{1,6}")
            .expect("static regex: file path"),
        // URLs
        Regex::new(r"https?://[^\s)\]]+").expect("static regex: url"),
        // scoped packages: @scope/package
        Regex::new(r"@[a-z0-9\-]+/[a-z0-9._\-]+").expect("static regex: scoped package"),
        // env assignments: LOG_LEVEL=debug
        Regex::new(r"\b[A-Z][A-Z0-9_]{2,}=\S+").expect("static regex: env assignment"),
        // call sites: connect(host, port)
        Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\([^)\n]*\)").expect("static regex: call site"),
    ]
});

/// Matches camelCase / PascalCase identifiers.
static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+[a-z][A-Z][A-Za-z]*$").expect("static regex: camel"));

/// Extract the top `max_k` keywords from `text`, scored descending then
/// lexicographic for stable output.
pub fn extract_keywords(text: &str, max_k: usize) -> Vec<ScoredKeyword> {
    if text.trim().is_empty() || max_k == 0 {
        return Vec::new();
    }

    let mut scores: HashMap<String, f64> = HashMap::new();

    // Frequency pass over whitespace-delimited words
    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if word.len() <= 2 || is_stop_word(&word.to_lowercase()) {
            continue;
        }

        let mut bonus = 0.0;
        if CAMEL_CASE.is_match(word) {
            bonus += 2.0;
        }
        if word.chars().any(|c| c.is_ascii_digit()) {
            bonus += 1.5;
        }

        let key = if bonus > 0.0 {
            word.to_string()
        } else {
            word.to_lowercase()
        };
        *scores.entry(key).or_insert(bonus) += 1.0;
    }

    // Pattern pass — matches count triple
    for pattern in PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            *scores.entry(m.as_str().to_string()).or_insert(0.0) += PATTERN_WEIGHT;
        }
    }

    // Capitalized runs — likely proper names ("Dashboard Component Manager")
    for run in capitalized_runs(text) {
        *scores.entry(run).or_insert(0.0) += 2.5;
    }

    let mut ranked: Vec<ScoredKeyword> = scores
        .into_iter()
        .map(|(term, score)| ScoredKeyword { term, score })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.term.cmp(&b.term))
    });
    ranked.truncate(max_k);
    ranked
}

/// Detect runs of two or more consecutive capitalized words.
pub fn capitalized_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = word
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && word.len() > 1;

        if capitalized {
            current.push(word);
        } else {
            if current.len() >= 2 {
                runs.push(current.join(" "));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        runs.push(current.join(" "));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_drives_base_score() {
        let kws = extract_keywords("cache cache cache database", 10);
        assert_eq!(kws[0].term, "cache");
        assert!(kws[0].score > kws[1].score);
    }

    #[test]
    fn camel_case_gets_bonus() {
        let kws = extract_keywords("handler DashboardGrid handler", 10);
        // "handler" appears twice (score 2.0); camelCase single occurrence scores 3.0
        let grid = kws.iter().find(|k| k.term == "DashboardGrid").unwrap();
        let handler = kws.iter().find(|k| k.term == "handler").unwrap();
        assert!(grid.score > handler.score);
    }

    #[test]
    fn patterns_weigh_triple() {
        let kws = extract_keywords("see src/memory/store.rs for details details details", 10);
        let path = kws.iter().find(|k| k.term.contains("store.rs")).unwrap();
        assert!(path.score >= 3.0);
    }

    #[test]
    fn env_assignment_and_url_detected() {
        let kws = extract_keywords("set LOG_LEVEL=debug docs at https://example.com/api", 10);
        assert!(kws.iter().any(|k| k.term == "LOG_LEVEL=debug"));
        assert!(kws.iter().any(|k| k.term.starts_with("https://")));
    }

    #[test]
    fn capitalized_run_extracted_as_phrase() {
        let runs = capitalized_runs("the Dashboard Component Manager renders grids");
        assert_eq!(runs, vec!["Dashboard Component Manager"]);
    }

    #[test]
    fn ordering_is_stable() {
        // equal scores → lexicographic
        let kws = extract_keywords("alpha beta gamma", 10);
        let terms: Vec<&str> = kws.iter().map(|k| k.term.as_str()).collect();
        assert_eq!(terms, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn respects_max_k() {
        let kws = extract_keywords("one two three four five six seven", 3);
        assert_eq!(kws.len(), 3);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(extract_keywords("", 10).is_empty());
        assert!(extract_keywords("   ", 10).is_empty());
    }
}
