//! Entity-to-entity similarity scoring with confidence bands and relation
//! type inference.
//!
//! The score is a weighted blend of name, type, content, name-pattern, and
//! structural features. Candidates at or above [`SIMILARITY_THRESHOLD`]
//! become matches, capped at [`MAX_MATCHES`] per target.

use serde::Serialize;

use crate::memory::types::Entity;
use crate::text::keywords::extract_keywords;
use crate::text::similarity::{jaccard, name_pattern_score, sentence_similarity};

/// Minimum blended score for a candidate to count as similar.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Maximum matches reported per target entity.
pub const MAX_MATCHES: usize = 8;

/// Confidence band for a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Band boundaries: high ≥ 0.85, medium ≥ 0.75, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Self::High
        } else if score >= 0.75 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One similarity match against a target entity.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMatch {
    #[serde(rename = "entityId")]
    pub entity_id: i64,
    #[serde(rename = "entityName")]
    pub entity_name: String,
    pub similarity: f64,
    pub confidence: Confidence,
    #[serde(rename = "suggestedRelationType")]
    pub suggested_relation_type: String,
    pub reasoning: String,
}

/// Score `target` against every candidate, returning matches at or above the
/// threshold, best first, capped at [`MAX_MATCHES`].
pub fn detect_similar(target: &Entity, candidates: &[Entity]) -> Vec<SimilarityMatch> {
    let mut matches: Vec<SimilarityMatch> = candidates
        .iter()
        .filter(|c| c.id != target.id)
        .filter_map(|candidate| {
            let features = score_pair(target, candidate);
            if features.total < SIMILARITY_THRESHOLD {
                return None;
            }
            Some(SimilarityMatch {
                entity_id: candidate.id,
                entity_name: candidate.name.clone(),
                similarity: features.total,
                confidence: Confidence::from_score(features.total),
                suggested_relation_type: suggest_relation_type(target, candidate, features.total),
                reasoning: format!(
                    "name {:.2}, type {:.2}, content {:.2}, pattern {:.2}",
                    features.name, features.entity_type, features.content, features.pattern
                ),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(MAX_MATCHES);
    matches
}

struct Features {
    name: f64,
    entity_type: f64,
    content: f64,
    pattern: f64,
    structural: f64,
    total: f64,
}

/// Blended feature score:
/// `0.35·name + 0.20·type + 0.25·content + 0.15·pattern + 0.05·structural`.
fn score_pair(a: &Entity, b: &Entity) -> Features {
    let name = sentence_similarity(&a.name, &b.name);

    let entity_type = if a.entity_type == b.entity_type {
        1.0
    } else {
        sentence_similarity(&a.entity_type, &b.entity_type)
    };

    let content = content_similarity(a, b);
    let pattern = name_pattern_score(&a.name, &b.name);
    let structural = structural_similarity(a, b);

    let total = 0.35 * name + 0.20 * entity_type + 0.25 * content + 0.15 * pattern
        + 0.05 * structural;

    Features {
        name,
        entity_type,
        content,
        pattern,
        structural,
        total,
    }
}

/// Content feature: `0.6·sentence + 0.4·keyword-set` over the joined
/// observations, or a neutral 0.3 when either side has no content.
fn content_similarity(a: &Entity, b: &Entity) -> f64 {
    let text_a = joined_observations(a);
    let text_b = joined_observations(b);
    if text_a.trim().is_empty() || text_b.trim().is_empty() {
        return 0.3;
    }

    let sentence = sentence_similarity(&text_a, &text_b);
    let keywords_a: Vec<String> = extract_keywords(&text_a, 10)
        .into_iter()
        .map(|k| k.term.to_lowercase())
        .collect();
    let keywords_b: Vec<String> = extract_keywords(&text_b, 10)
        .into_iter()
        .map(|k| k.term.to_lowercase())
        .collect();

    0.6 * sentence + 0.4 * jaccard(&keywords_a, &keywords_b)
}

fn joined_observations(entity: &Entity) -> String {
    entity
        .observations
        .iter()
        .map(|o| o.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structural feature: observation-count balance (0.4 weight) plus a 0.3
/// bump for matching statuses, clamped to 1.
fn structural_similarity(a: &Entity, b: &Entity) -> f64 {
    let o1 = a.observations.len() as f64;
    let o2 = b.observations.len() as f64;
    let balance = if o1.max(o2) == 0.0 {
        1.0
    } else {
        1.0 - (o1 - o2).abs() / o1.max(o2)
    };

    let mut score = 0.4 * balance;
    if a.status == b.status {
        score += 0.3;
    }
    score.min(1.0)
}

/// Infer the relation type for a match.
///
/// Name containment wins: the longer name `contains` the shorter, the
/// shorter is `part_of` the longer. Entities sharing a type are
/// `similar_to`; very high scores are `closely_related`; everything else is
/// `related_to`.
fn suggest_relation_type(target: &Entity, candidate: &Entity, score: f64) -> String {
    let target_lower = target.name.to_lowercase();
    let candidate_lower = candidate.name.to_lowercase();

    if target_lower != candidate_lower {
        if target_lower.contains(&candidate_lower) {
            return "contains".to_string();
        }
        if candidate_lower.contains(&target_lower) {
            return "part_of".to_string();
        }
    }

    if score > 0.9 {
        return "closely_related".to_string();
    }
    if target.entity_type == candidate.entity_type {
        return "similar_to".to_string();
    }
    "related_to".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{EntityStatus, Observation};

    fn entity(id: i64, name: &str, entity_type: &str, observations: &[&str]) -> Entity {
        Entity {
            id,
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            branch_id: 1,
            status: EntityStatus::Active,
            status_reason: None,
            original_content: observations.join("\n"),
            optimized_content: observations.join("\n"),
            token_count: 0,
            compression_ratio: 1.0,
            created_at: String::new(),
            updated_at: String::new(),
            last_accessed: String::new(),
            observations: observations
                .iter()
                .enumerate()
                .map(|(i, o)| Observation {
                    id: i as i64,
                    entity_id: id,
                    content: o.to_string(),
                    optimized_content: o.to_string(),
                    sequence_order: i as i64 + 1,
                    created_at: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(Confidence::from_score(0.9), Confidence::High);
        assert_eq!(Confidence::from_score(0.85), Confidence::High);
        assert_eq!(Confidence::from_score(0.8), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.75), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.6), Confidence::Low);
        assert!(Confidence::High > Confidence::Medium);
    }

    #[test]
    fn same_type_shared_name_words_match_as_similar_to() {
        let target = entity(1, "Dashboard Component Manager", "component", &[]);
        let candidate = entity(2, "Dashboard Grid System", "component", &[]);

        let matches = detect_similar(&target, std::slice::from_ref(&candidate));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].similarity >= SIMILARITY_THRESHOLD);
        assert!(matches[0].similarity < 0.9);
        assert_eq!(matches[0].suggested_relation_type, "similar_to");
    }

    #[test]
    fn unrelated_entities_fall_below_threshold() {
        let target = entity(1, "User Authentication Service", "service", &[]);
        let candidate = entity(2, "Database Connection Pool", "infrastructure", &[]);

        let matches = detect_similar(&target, std::slice::from_ref(&candidate));
        assert!(matches.is_empty());
    }

    #[test]
    fn containment_suggests_contains_and_part_of() {
        let long = entity(1, "Payment Gateway Adapter", "service", &[]);
        let short = entity(2, "Payment Gateway", "service", &[]);

        let from_long = detect_similar(&long, std::slice::from_ref(&short));
        assert_eq!(from_long[0].suggested_relation_type, "contains");

        let from_short = detect_similar(&short, std::slice::from_ref(&long));
        assert_eq!(from_short[0].suggested_relation_type, "part_of");
    }

    #[test]
    fn near_identical_names_score_high_confidence() {
        let target = entity(1, "Session Store", "service", &["keeps sessions in redis"]);
        let candidate = entity(2, "Sessions Store", "service", &["keeps sessions in redis"]);

        let matches = detect_similar(&target, std::slice::from_ref(&candidate));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].similarity >= 0.85, "got {}", matches[0].similarity);
        assert_eq!(matches[0].confidence, Confidence::High);
        assert_eq!(matches[0].suggested_relation_type, "similar_to");
    }

    #[test]
    fn identical_names_are_closely_related() {
        // same name in the candidate set (e.g. re-imported twin) — the
        // equal-name guard must not report containment
        let target = entity(1, "Session Store", "service", &["keeps sessions in redis"]);
        let candidate = entity(2, "Session Store", "service", &["keeps sessions in redis"]);

        let matches = detect_similar(&target, std::slice::from_ref(&candidate));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].similarity > 0.9, "got {}", matches[0].similarity);
        assert_eq!(matches[0].suggested_relation_type, "closely_related");
    }

    #[test]
    fn target_is_never_its_own_match() {
        let target = entity(1, "Cache", "service", &[]);
        let matches = detect_similar(&target, std::slice::from_ref(&target));
        assert!(matches.is_empty());
    }

    #[test]
    fn results_sorted_and_capped() {
        let target = entity(0, "Widget Service Alpha", "service", &[]);
        let candidates: Vec<Entity> = (1..=12)
            .map(|i| entity(i, &format!("Widget Service {i}"), "service", &[]))
            .collect();

        let matches = detect_similar(&target, &candidates);
        assert!(matches.len() <= MAX_MATCHES);
        for pair in matches.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn empty_content_is_neutral_not_zero() {
        let a = entity(1, "Alpha Service", "service", &[]);
        let b = entity(2, "Alpha Service Core", "service", &["some content"]);
        let score = content_similarity(&a, &b);
        assert!((score - 0.3).abs() < f64::EPSILON);
    }
}
