//! Multi-strategy ranked retrieval: keyword index, FTS5, and LIKE scans
//! merged into a single relevance ordering.
//!
//! Each strategy contributes `(entity_id, raw_score)` pairs plus a fixed
//! bonus for having matched at all. Hits are merged by entity id, ranked by
//! the summed relevance, tie-broken by recency of access, and truncated.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::memory::error::Result;
use crate::memory::store;
use crate::memory::types::{Entity, EntityStatus, RelationRecord};
use crate::text;

/// Hard cap on returned entities.
pub const MAX_RESULTS: usize = 50;

const KEYWORD_BONUS: f64 = 15.0;
const FTS_BONUS: f64 = 10.0;
const LIKE_BONUS: f64 = 5.0;

// ── Public types ──────────────────────────────────────────────────────────────

/// Which branches a search covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchScope {
    /// A single named branch.
    Branch(String),
    /// Every branch (`"*"` at the tool surface).
    All,
}

impl BranchScope {
    /// Parse the tool-surface convention: `"*"` means all branches.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "*" {
            Self::All
        } else {
            Self::Branch(arg.to_string())
        }
    }
}

/// One ranked search result.
#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    /// Best raw score per strategy, when the strategy matched.
    #[serde(skip)]
    pub keyword_score: Option<f64>,
    #[serde(skip)]
    pub fts_score: Option<f64>,
    #[serde(skip)]
    pub like_score: Option<f64>,
}

/// The graph fragment a search returns: ranked entities plus the relations
/// whose endpoints both survived ranking.
#[derive(Debug, Default, Serialize)]
pub struct SearchResponse {
    pub entities: Vec<SearchHit>,
    pub relations: Vec<RelationRecord>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Normalize a query into deduplicated search terms.
///
/// Lowercases, splits on whitespace and `- _ , . /`, drops single characters
/// and stop words.
pub fn prepare_terms(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | ',' | '.' | '/'))
        .filter(|t| t.len() > 1 && !text::is_stop_word(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Run the three-strategy search pipeline.
///
/// `statuses` defaults to active-only at the orchestrator; an empty slice
/// here means no status filtering.
pub fn search(
    conn: &Connection,
    query: &str,
    scope: &BranchScope,
    statuses: &[EntityStatus],
) -> Result<SearchResponse> {
    let terms = prepare_terms(query);
    if terms.is_empty() {
        return Ok(SearchResponse::default());
    }

    let branch_id = match scope {
        BranchScope::All => None,
        BranchScope::Branch(name) => match store::branch_id(conn, name)? {
            Some(id) => Some(id),
            None => {
                tracing::debug!(branch = %name, "search scoped to unknown branch");
                return Ok(SearchResponse::default());
            }
        },
    };

    let keyword_hits = keyword_strategy(conn, &terms, branch_id, statuses)?;
    let fts_hits = fts_strategy(conn, &terms, branch_id, statuses);
    let like_hits = like_strategy(conn, &terms, branch_id, statuses)?;

    // Merge by entity id: relevance accumulates raw score + strategy bonus.
    struct Merged {
        relevance: f64,
        keyword: Option<f64>,
        fts: Option<f64>,
        like: Option<f64>,
    }
    let mut merged: HashMap<i64, Merged> = HashMap::new();
    let mut fold = |hits: Vec<(i64, f64)>, bonus: f64, pick: fn(&mut Merged) -> &mut Option<f64>| {
        for (id, raw) in hits {
            let entry = merged.entry(id).or_insert(Merged {
                relevance: 0.0,
                keyword: None,
                fts: None,
                like: None,
            });
            entry.relevance += raw + bonus;
            let slot = pick(entry);
            let best = slot.map_or(raw, |prev| prev.max(raw));
            *slot = Some(best);
        }
    };
    fold(keyword_hits, KEYWORD_BONUS, |m| &mut m.keyword);
    fold(fts_hits, FTS_BONUS, |m| &mut m.fts);
    fold(like_hits, LIKE_BONUS, |m| &mut m.like);

    if merged.is_empty() {
        return Ok(SearchResponse::default());
    }

    let ids: Vec<i64> = merged.keys().copied().collect();
    let entities = store::entities_by_ids(conn, &ids)?;

    let mut hits: Vec<SearchHit> = entities
        .into_iter()
        .filter_map(|entity| {
            merged.get(&entity.id).map(|m| SearchHit {
                relevance_score: m.relevance,
                keyword_score: m.keyword,
                fts_score: m.fts,
                like_score: m.like,
                entity,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.entity.last_accessed.cmp(&a.entity.last_accessed))
    });
    hits.truncate(MAX_RESULTS);

    let surviving_ids: Vec<i64> = hits.iter().map(|h| h.entity.id).collect();
    store::touch_entities(conn, &surviving_ids)?;
    let relations = store::relations_within(conn, &surviving_ids, branch_id)?;

    Ok(SearchResponse {
        entities: hits,
        relations,
    })
}

// ── Strategies ────────────────────────────────────────────────────────────────

/// Keyword index strategy: any `keywords.keyword LIKE %term%` row counts;
/// score is `matched_rows × max(weight)`.
fn keyword_strategy(
    conn: &Connection,
    terms: &[String],
    branch_id: Option<i64>,
    statuses: &[EntityStatus],
) -> Result<Vec<(i64, f64)>> {
    let like_clauses: Vec<String> = (1..=terms.len())
        .map(|i| format!("k.keyword LIKE ?{i}"))
        .collect();
    let branch_clause = branch_id.map_or(String::new(), |id| {
        format!(" AND e.branch_id = {id}")
    });
    let sql = format!(
        "SELECT k.entity_id, COUNT(k.id), MAX(k.weight) \
         FROM keywords k JOIN entities e ON e.id = k.entity_id \
         WHERE ({}){}{} \
         GROUP BY k.entity_id",
        like_clauses.join(" OR "),
        branch_clause,
        status_clause(statuses),
    );

    let patterns: Vec<String> = terms.iter().map(|t| format!("%{t}%")).collect();
    let sql_params: Vec<&dyn rusqlite::types::ToSql> = patterns
        .iter()
        .map(|p| p as &dyn rusqlite::types::ToSql)
        .collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sql_params.as_slice(), |row| {
            let matched: i64 = row.get(1)?;
            let max_weight: f64 = row.get(2)?;
            Ok((row.get::<_, i64>(0)?, matched as f64 * max_weight))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// FTS5 strategy: OR-of-terms MATCH using the engine's rank (negated so
/// larger is better). A MATCH failure degrades to an empty contribution.
fn fts_strategy(
    conn: &Connection,
    terms: &[String],
    branch_id: Option<i64>,
    statuses: &[EntityStatus],
) -> Vec<(i64, f64)> {
    let match_query = terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ");

    let branch_clause = branch_id.map_or(String::new(), |id| {
        format!(" AND e.branch_id = {id}")
    });
    let sql = format!(
        "SELECT e.id, f.rank \
         FROM entities_fts f JOIN entities e ON e.id = f.rowid \
         WHERE entities_fts MATCH ?1{}{} \
         ORDER BY f.rank",
        branch_clause,
        status_clause(statuses),
    );

    let run = || -> rusqlite::Result<Vec<(i64, f64)>> {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![match_query], |row| {
                let rank: f64 = row.get(1)?;
                Ok((row.get::<_, i64>(0)?, -rank))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    };

    match run() {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, query = %match_query, "FTS strategy unavailable, continuing without it");
            Vec::new()
        }
    }
}

/// LIKE strategy: per term, name +10, type +8, any observation +3; summed
/// across terms.
fn like_strategy(
    conn: &Connection,
    terms: &[String],
    branch_id: Option<i64>,
    statuses: &[EntityStatus],
) -> Result<Vec<(i64, f64)>> {
    let branch_clause = branch_id.map_or(String::new(), |id| {
        format!(" AND e.branch_id = {id}")
    });
    let sql = format!(
        "SELECT e.id, \
           (CASE WHEN e.name LIKE ?1 THEN 10 ELSE 0 END) + \
           (CASE WHEN e.entity_type LIKE ?1 THEN 8 ELSE 0 END) + \
           (CASE WHEN EXISTS(SELECT 1 FROM observations o \
                             WHERE o.entity_id = e.id AND o.content LIKE ?1) \
            THEN 3 ELSE 0 END) \
         FROM entities e \
         WHERE 1=1{}{}",
        branch_clause,
        status_clause(statuses),
    );

    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut stmt = conn.prepare(&sql)?;
    for term in terms {
        let pattern = format!("%{term}%");
        let rows = stmt
            .query_map(params![pattern], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<(i64, i64)>, _>>()?;
        for (id, score) in rows {
            if score > 0 {
                *scores.entry(id).or_insert(0.0) += score as f64;
            }
        }
    }
    Ok(scores.into_iter().collect())
}

fn status_clause(statuses: &[EntityStatus]) -> String {
    if statuses.is_empty() {
        return String::new();
    }
    let list: Vec<String> = statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!(" AND e.status IN ({})", list.join(", "))
}
