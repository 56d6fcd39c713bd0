//! Transactional persistence over the branch/entity/relation data model.
//!
//! Every operation that touches multiple rows (entity + observations +
//! keywords + cross-references, or relation endpoint lookups + insert) runs
//! inside a single transaction: on failure the state is unchanged. All
//! statements are parameterized.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::MAIN_BRANCH;
use crate::memory::error::{MemoryError, Result};
use crate::memory::types::{
    Branch, BranchInfo, CrossRefInput, Entity, EntityRecord, EntityStatus, GraphExport,
    KeywordSpec, Observation, RelationRecord,
};

/// A fully processed entity ready for insertion — compression and keyword
/// derivation have already run in the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    pub status: EntityStatus,
    pub status_reason: Option<String>,
    pub original_content: String,
    pub optimized_content: String,
    pub token_count: i64,
    pub compression_ratio: f64,
    pub observations: Vec<NewObservation>,
    pub keywords: Vec<KeywordSpec>,
    pub cross_references: Vec<CrossRefInput>,
}

/// An observation paired with its compressed form.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub content: String,
    pub optimized_content: String,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ── Branches ─────────────────────────────────────────────────────────────────

/// Permissive identifier check for branch names.
pub fn is_valid_branch_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    name.len() <= 100
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'))
}

/// Look up a branch id by name.
pub fn branch_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM branches WHERE name = ?1", params![name], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(id)
}

/// Look up a branch id by name, failing with `NotFound` if absent.
pub fn require_branch(conn: &Connection, name: &str) -> Result<i64> {
    branch_id(conn, name)?.ok_or_else(|| MemoryError::NotFound(format!("branch '{name}'")))
}

/// Return the branch id, creating the branch if this is the first reference
/// to its name.
pub fn ensure_branch(conn: &Connection, name: &str) -> Result<i64> {
    if !is_valid_branch_name(name) {
        return Err(MemoryError::Invalid(format!("invalid branch name: '{name}'")));
    }
    if let Some(id) = branch_id(conn, name)? {
        return Ok(id);
    }
    let ts = now();
    conn.execute(
        "INSERT INTO branches (name, purpose, created_at, updated_at) VALUES (?1, '', ?2, ?2)",
        params![name, ts],
    )?;
    tracing::debug!(branch = name, "branch created implicitly");
    Ok(conn.last_insert_rowid())
}

/// Create a branch explicitly. Fails with `DuplicateBranch` if the name is
/// taken (including the reserved `main`).
pub fn create_branch(conn: &Connection, name: &str, purpose: Option<&str>) -> Result<Branch> {
    if !is_valid_branch_name(name) {
        tracing::warn!(branch = name, "rejected invalid branch name");
        return Err(MemoryError::Invalid(format!("invalid branch name: '{name}'")));
    }
    if branch_id(conn, name)?.is_some() {
        return Err(MemoryError::DuplicateBranch(name.to_string()));
    }
    let ts = now();
    conn.execute(
        "INSERT INTO branches (name, purpose, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![name, purpose.unwrap_or(""), ts],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Branch {
        id,
        name: name.to_string(),
        purpose: purpose.unwrap_or("").to_string(),
        created_at: ts.clone(),
        updated_at: ts,
    })
}

/// Delete a branch and everything in it. The `main` branch is protected; a
/// missing branch is `NotFound`.
///
/// Entities are deleted with an explicit statement (not the branch FK
/// cascade) so the FTS shadow triggers fire for every row.
pub fn delete_branch(conn: &mut Connection, name: &str) -> Result<()> {
    if name == MAIN_BRANCH {
        return Err(MemoryError::CannotDeleteMain);
    }
    let tx = conn.transaction()?;
    let id = require_branch(&tx, name)?;
    tx.execute("DELETE FROM entities WHERE branch_id = ?1", params![id])?;
    tx.execute("DELETE FROM branches WHERE id = ?1", params![id])?;
    tx.commit()?;
    tracing::info!(branch = name, "branch deleted");
    Ok(())
}

/// List all branches with aggregate entity/relation counts, `main` first and
/// the rest lexicographic.
pub fn list_branches(conn: &Connection) -> Result<Vec<BranchInfo>> {
    let mut stmt = conn.prepare(
        "SELECT b.name, b.purpose, b.updated_at, \
           (SELECT COUNT(*) FROM entities e WHERE e.branch_id = b.id), \
           (SELECT COUNT(*) FROM relations r WHERE r.branch_id = b.id) \
         FROM branches b \
         ORDER BY CASE WHEN b.name = 'main' THEN 0 ELSE 1 END, b.name",
    )?;
    let branches = stmt
        .query_map([], |row| {
            Ok(BranchInfo {
                name: row.get(0)?,
                purpose: row.get(1)?,
                updated_at: row.get(2)?,
                entity_count: row.get(3)?,
                relation_count: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(branches)
}

/// All branch ids, `main` first.
pub fn all_branch_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM branches ORDER BY CASE WHEN name = 'main' THEN 0 ELSE 1 END, name",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Refresh a branch's `updated_at` after a write that touched it.
fn touch_branch(conn: &Connection, branch_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE branches SET updated_at = ?1 WHERE id = ?2",
        params![now(), branch_id],
    )?;
    Ok(())
}

// ── Entities ─────────────────────────────────────────────────────────────────

/// Insert an entity with its observations, keywords, and cross-references in
/// one transaction. Fails with `DuplicateEntity` when `(name, branch)` is
/// taken.
pub fn create_entity(conn: &mut Connection, branch: &str, entity: &NewEntity) -> Result<Entity> {
    if entity.name.trim().is_empty() {
        return Err(MemoryError::Invalid("entity name must not be empty".into()));
    }
    if entity.entity_type.trim().is_empty() {
        return Err(MemoryError::Invalid("entity type must not be empty".into()));
    }

    let tx = conn.transaction()?;
    let branch_id = ensure_branch(&tx, branch)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM entities WHERE name = ?1 AND branch_id = ?2",
        params![entity.name, branch_id],
        |r| r.get(0),
    )?;
    if exists {
        return Err(MemoryError::DuplicateEntity(format!(
            "'{}' in branch '{branch}'",
            entity.name
        )));
    }

    let ts = now();
    tx.execute(
        "INSERT INTO entities (name, entity_type, branch_id, status, status_reason, \
         original_content, optimized_content, token_count, compression_ratio, \
         created_at, updated_at, last_accessed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?10)",
        params![
            entity.name,
            entity.entity_type,
            branch_id,
            entity.status.as_str(),
            entity.status_reason,
            entity.original_content,
            entity.optimized_content,
            entity.token_count,
            entity.compression_ratio,
            ts,
        ],
    )?;
    let entity_id = tx.last_insert_rowid();

    insert_observations(&tx, entity_id, &entity.observations, 0)?;
    insert_keywords(&tx, entity_id, &entity.keywords)?;
    replace_cross_references(&tx, entity_id, &entity.cross_references, false)?;

    touch_branch(&tx, branch_id)?;
    tx.commit()?;

    tracing::debug!(entity = %entity.name, branch, "entity created");
    load_entity(conn, branch_id, &entity.name)?
        .ok_or_else(|| MemoryError::NotFound(format!("entity '{}' after insert", entity.name)))
}

/// Replace an entity's type, status, reason, content fields, observations,
/// keywords, and cross-references. Fails with `NotFound` if absent.
pub fn update_entity(conn: &mut Connection, branch: &str, entity: &NewEntity) -> Result<Entity> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;
    let entity_id = entity_id_in_branch(&tx, branch_id, &entity.name)?.ok_or_else(|| {
        MemoryError::NotFound(format!("entity '{}' in branch '{branch}'", entity.name))
    })?;

    tx.execute(
        "UPDATE entities SET entity_type = ?1, status = ?2, status_reason = ?3, \
         original_content = ?4, optimized_content = ?5, token_count = ?6, \
         compression_ratio = ?7, updated_at = ?8 WHERE id = ?9",
        params![
            entity.entity_type,
            entity.status.as_str(),
            entity.status_reason,
            entity.original_content,
            entity.optimized_content,
            entity.token_count,
            entity.compression_ratio,
            now(),
            entity_id,
        ],
    )?;

    tx.execute(
        "DELETE FROM observations WHERE entity_id = ?1",
        params![entity_id],
    )?;
    insert_observations(&tx, entity_id, &entity.observations, 0)?;

    tx.execute("DELETE FROM keywords WHERE entity_id = ?1", params![entity_id])?;
    insert_keywords(&tx, entity_id, &entity.keywords)?;

    replace_cross_references(&tx, entity_id, &entity.cross_references, true)?;

    touch_branch(&tx, branch_id)?;
    tx.commit()?;

    load_entity(conn, branch_id, &entity.name)?
        .ok_or_else(|| MemoryError::NotFound(format!("entity '{}' after update", entity.name)))
}

/// Delete entities by name. Observations, keywords, cross-references, and
/// incident relations cascade; the FTS shadow row is dropped by trigger.
/// Returns the names actually deleted.
pub fn delete_entities(
    conn: &mut Connection,
    branch: &str,
    names: &[String],
) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;

    let mut deleted = Vec::new();
    for name in names {
        let rows = tx.execute(
            "DELETE FROM entities WHERE name = ?1 AND branch_id = ?2",
            params![name, branch_id],
        )?;
        if rows > 0 {
            deleted.push(name.clone());
        } else {
            tracing::debug!(entity = %name, branch, "delete skipped: not found");
        }
    }

    if !deleted.is_empty() {
        touch_branch(&tx, branch_id)?;
    }
    tx.commit()?;
    Ok(deleted)
}

/// Append observations after the current `max(sequence_order)`. Blank
/// contents are dropped; returns the contents actually added.
pub fn add_observations(
    conn: &mut Connection,
    branch: &str,
    entity_name: &str,
    observations: &[NewObservation],
) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;
    let entity_id = entity_id_in_branch(&tx, branch_id, entity_name)?.ok_or_else(|| {
        MemoryError::NotFound(format!("entity '{entity_name}' in branch '{branch}'"))
    })?;

    let max_seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence_order), 0) FROM observations WHERE entity_id = ?1",
        params![entity_id],
        |r| r.get(0),
    )?;

    let added = insert_observations(&tx, entity_id, observations, max_seq)?;

    if !added.is_empty() {
        tx.execute(
            "UPDATE entities SET updated_at = ?1 WHERE id = ?2",
            params![now(), entity_id],
        )?;
        touch_branch(&tx, branch_id)?;
    }
    tx.commit()?;
    Ok(added)
}

/// Delete observations by exact content match (case-sensitive). Survivors
/// keep their sequence numbers. Returns the number deleted.
pub fn delete_observations(
    conn: &mut Connection,
    branch: &str,
    entity_name: &str,
    contents: &[String],
) -> Result<usize> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;
    let entity_id = entity_id_in_branch(&tx, branch_id, entity_name)?.ok_or_else(|| {
        MemoryError::NotFound(format!("entity '{entity_name}' in branch '{branch}'"))
    })?;

    let mut removed = 0;
    for content in contents {
        removed += tx.execute(
            "DELETE FROM observations WHERE entity_id = ?1 AND content = ?2",
            params![entity_id, content],
        )?;
    }

    if removed > 0 {
        touch_branch(&tx, branch_id)?;
    }
    tx.commit()?;
    Ok(removed)
}

/// Load a single entity (with observations) by name within a branch.
pub fn load_entity(conn: &Connection, branch_id: i64, name: &str) -> Result<Option<Entity>> {
    let row = conn
        .query_row(
            &format!("{ENTITY_COLUMNS} WHERE e.name = ?1 AND e.branch_id = ?2"),
            params![name, branch_id],
            entity_from_row,
        )
        .optional()?;

    match row {
        Some(mut entity) => {
            entity.observations = load_observations(conn, entity.id)?;
            Ok(Some(entity))
        }
        None => Ok(None),
    }
}

/// Fetch entities in a branch filtered by status, ordered by id, optionally
/// limited.
pub fn entities_in_branch(
    conn: &Connection,
    branch_id: i64,
    statuses: &[EntityStatus],
    limit: Option<usize>,
) -> Result<Vec<Entity>> {
    let status_clause = status_in_clause(statuses);
    let limit_clause = limit.map_or(String::new(), |n| format!(" LIMIT {n}"));
    let sql = format!(
        "{ENTITY_COLUMNS} WHERE e.branch_id = ?1{status_clause} ORDER BY e.id{limit_clause}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![branch_id], entity_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    attach_observations(conn, rows)
}

/// Fetch entities by exact name within a branch, filtered by status.
pub fn entities_by_names(
    conn: &Connection,
    branch_id: i64,
    names: &[String],
    statuses: &[EntityStatus],
) -> Result<Vec<Entity>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (2..=names.len() + 1).map(|i| format!("?{i}")).collect();
    let status_clause = status_in_clause(statuses);
    let sql = format!(
        "{ENTITY_COLUMNS} WHERE e.branch_id = ?1 AND e.name IN ({}){status_clause} ORDER BY e.id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&branch_id];
    for name in names {
        sql_params.push(name);
    }
    let rows = stmt
        .query_map(sql_params.as_slice(), entity_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    attach_observations(conn, rows)
}

/// Batch-fetch entities by id (any branch), with observations.
pub fn entities_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Entity>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "{ENTITY_COLUMNS} WHERE e.id IN ({}) ORDER BY e.id",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let sql_params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt
        .query_map(sql_params.as_slice(), entity_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    attach_observations(conn, rows)
}

/// Batch update `last_accessed` for entities returned to a caller.
pub fn touch_entities(conn: &Connection, ids: &[i64]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let ts = now();
    let mut stmt =
        conn.prepare("UPDATE entities SET last_accessed = ?1 WHERE id = ?2")?;
    for id in ids {
        stmt.execute(params![ts, id])?;
    }
    Ok(())
}

/// Keyword rows attached to an entity.
pub fn keywords_for_entity(conn: &Connection, entity_id: i64) -> Result<Vec<KeywordSpec>> {
    let mut stmt = conn.prepare(
        "SELECT keyword, weight, context FROM keywords WHERE entity_id = ?1 ORDER BY weight DESC, keyword",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| {
            Ok(KeywordSpec {
                keyword: row.get(0)?,
                weight: row.get(1)?,
                context: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Relations ────────────────────────────────────────────────────────────────

/// Create relations by endpoint name. Endpoints that do not resolve in the
/// branch are skipped; duplicates are silent no-ops. Returns only the
/// relations actually inserted.
pub fn create_relations(
    conn: &mut Connection,
    branch: &str,
    relations: &[RelationRecord],
) -> Result<Vec<RelationRecord>> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;

    let mut created = Vec::new();
    for rel in relations {
        let from_id = entity_id_in_branch(&tx, branch_id, &rel.from)?;
        let to_id = entity_id_in_branch(&tx, branch_id, &rel.to)?;
        let (Some(from_id), Some(to_id)) = (from_id, to_id) else {
            tracing::debug!(
                from = %rel.from,
                to = %rel.to,
                branch,
                "relation skipped: endpoint missing"
            );
            continue;
        };

        let rows = tx.execute(
            "INSERT OR IGNORE INTO relations \
             (from_entity_id, to_entity_id, relation_type, branch_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![from_id, to_id, rel.relation_type, branch_id, now()],
        )?;
        if rows > 0 {
            created.push(rel.clone());
        }
    }

    if !created.is_empty() {
        touch_branch(&tx, branch_id)?;
    }
    tx.commit()?;
    Ok(created)
}

/// Delete relations by key. Absent rows are no-ops. Returns the number
/// deleted.
pub fn delete_relations(
    conn: &mut Connection,
    branch: &str,
    relations: &[RelationRecord],
) -> Result<usize> {
    let tx = conn.transaction()?;
    let branch_id = require_branch(&tx, branch)?;

    let mut removed = 0;
    for rel in relations {
        let from_id = entity_id_in_branch(&tx, branch_id, &rel.from)?;
        let to_id = entity_id_in_branch(&tx, branch_id, &rel.to)?;
        let (Some(from_id), Some(to_id)) = (from_id, to_id) else {
            continue;
        };
        removed += tx.execute(
            "DELETE FROM relations WHERE from_entity_id = ?1 AND to_entity_id = ?2 \
             AND relation_type = ?3",
            params![from_id, to_id, rel.relation_type],
        )?;
    }

    if removed > 0 {
        touch_branch(&tx, branch_id)?;
    }
    tx.commit()?;
    Ok(removed)
}

/// Relations whose endpoints BOTH lie in `ids`, as name records.
pub fn relations_within(
    conn: &Connection,
    ids: &[i64],
    branch_id: Option<i64>,
) -> Result<Vec<RelationRecord>> {
    relations_query(conn, ids, branch_id, false)
}

/// Relations with EITHER endpoint in `ids`, as name records.
pub fn relations_incident(
    conn: &Connection,
    ids: &[i64],
    branch_id: i64,
) -> Result<Vec<RelationRecord>> {
    relations_query(conn, ids, Some(branch_id), true)
}

fn relations_query(
    conn: &Connection,
    ids: &[i64],
    branch_id: Option<i64>,
    either_endpoint: bool,
) -> Result<Vec<RelationRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let in_list = placeholders.join(", ");
    let endpoint_clause = if either_endpoint {
        format!("(r.from_entity_id IN ({in_list}) OR r.to_entity_id IN ({in_list}))")
    } else {
        format!("r.from_entity_id IN ({in_list}) AND r.to_entity_id IN ({in_list})")
    };
    let branch_clause = branch_id.map_or(String::new(), |id| {
        format!(" AND r.branch_id = {id}")
    });

    let sql = format!(
        "SELECT DISTINCT ef.name, et.name, r.relation_type \
         FROM relations r \
         JOIN entities ef ON ef.id = r.from_entity_id \
         JOIN entities et ON et.id = r.to_entity_id \
         WHERE {endpoint_clause}{branch_clause} \
         ORDER BY ef.name, et.name, r.relation_type"
    );

    let mut stmt = conn.prepare(&sql)?;
    let sql_params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt
        .query_map(sql_params.as_slice(), |row| {
            Ok(RelationRecord {
                from: row.get(0)?,
                to: row.get(1)?,
                relation_type: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Cross-references ─────────────────────────────────────────────────────────

/// Attach by-name cross-references from an entity to names in another
/// branch. The source entity must exist; target names missing in the target
/// branch at call time are silently skipped. Returns the names added.
pub fn create_cross_references(
    conn: &mut Connection,
    source_branch: &str,
    entity_name: &str,
    target_branch: &str,
    target_names: &[String],
) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let source_branch_id = require_branch(&tx, source_branch)?;
    let entity_id = entity_id_in_branch(&tx, source_branch_id, entity_name)?.ok_or_else(|| {
        MemoryError::NotFound(format!("entity '{entity_name}' in branch '{source_branch}'"))
    })?;
    let target_branch_id = ensure_branch(&tx, target_branch)?;

    let mut added = Vec::new();
    for target in target_names {
        let target_exists = entity_id_in_branch(&tx, target_branch_id, target)?.is_some();
        if !target_exists {
            tracing::debug!(
                target = %target,
                branch = target_branch,
                "cross-reference skipped: target missing"
            );
            continue;
        }
        let rows = tx.execute(
            "INSERT OR IGNORE INTO cross_references \
             (from_entity_id, target_branch_id, target_entity_name, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![entity_id, target_branch_id, target, now()],
        )?;
        if rows > 0 {
            added.push(target.clone());
        }
    }

    if !added.is_empty() {
        touch_branch(&tx, source_branch_id)?;
    }
    tx.commit()?;
    Ok(added)
}

/// Cross-references of an entity, grouped by target branch.
pub fn get_cross_references(
    conn: &Connection,
    branch: &str,
    entity_name: &str,
) -> Result<Vec<CrossRefInput>> {
    let branch_id = require_branch(conn, branch)?;
    let entity_id = entity_id_in_branch(conn, branch_id, entity_name)?.ok_or_else(|| {
        MemoryError::NotFound(format!("entity '{entity_name}' in branch '{branch}'"))
    })?;

    let mut stmt = conn.prepare(
        "SELECT b.name, x.target_entity_name \
         FROM cross_references x \
         JOIN branches b ON b.id = x.target_branch_id \
         WHERE x.from_entity_id = ?1 \
         ORDER BY b.name, x.target_entity_name",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<(String, String)>, _>>()?;

    let mut groups: Vec<CrossRefInput> = Vec::new();
    for (branch_name, target) in rows {
        match groups.last_mut() {
            Some(group) if group.memory_branch == branch_name => {
                group.entity_names.push(target);
            }
            _ => groups.push(CrossRefInput {
                memory_branch: branch_name,
                entity_names: vec![target],
            }),
        }
    }
    Ok(groups)
}

// ── Whole-branch reads ───────────────────────────────────────────────────────

/// Read a branch's full graph as wire records (for export and snapshots).
pub fn branch_records(conn: &Connection, branch: &str) -> Result<GraphExport> {
    let branch_id = require_branch(conn, branch)?;
    let entities = entities_in_branch(
        conn,
        branch_id,
        &[
            EntityStatus::Active,
            EntityStatus::Deprecated,
            EntityStatus::Archived,
            EntityStatus::Draft,
        ],
        None,
    )?;

    let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
    let relations = relations_within(conn, &ids, Some(branch_id))?;

    let mut records = Vec::with_capacity(entities.len());
    for entity in &entities {
        let cross_references = get_cross_references(conn, branch, &entity.name)?;
        records.push(EntityRecord::from_entity(entity, cross_references));
    }

    Ok(GraphExport {
        entities: records,
        relations,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

const ENTITY_COLUMNS: &str = "SELECT e.id, e.name, e.entity_type, e.branch_id, e.status, \
    e.status_reason, e.original_content, e.optimized_content, e.token_count, \
    e.compression_ratio, e.created_at, e.updated_at, e.last_accessed FROM entities e";

fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let status_str: String = row.get(4)?;
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: row.get(2)?,
        branch_id: row.get(3)?,
        status: status_str
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        status_reason: row.get(5)?,
        original_content: row.get(6)?,
        optimized_content: row.get(7)?,
        token_count: row.get(8)?,
        compression_ratio: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_accessed: row.get(12)?,
        observations: Vec::new(),
    })
}

fn entity_id_in_branch(
    conn: &Connection,
    branch_id: i64,
    name: &str,
) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM entities WHERE name = ?1 AND branch_id = ?2",
            params![name, branch_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn load_observations(conn: &Connection, entity_id: i64) -> Result<Vec<Observation>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_id, content, optimized_content, sequence_order, created_at \
         FROM observations WHERE entity_id = ?1 ORDER BY sequence_order",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| {
            Ok(Observation {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                content: row.get(2)?,
                optimized_content: row.get(3)?,
                sequence_order: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn attach_observations(conn: &Connection, mut entities: Vec<Entity>) -> Result<Vec<Entity>> {
    for entity in &mut entities {
        entity.observations = load_observations(conn, entity.id)?;
    }
    Ok(entities)
}

/// Insert observations after `start_seq`, skipping blanks. Returns the
/// contents actually inserted.
fn insert_observations(
    conn: &Connection,
    entity_id: i64,
    observations: &[NewObservation],
    start_seq: i64,
) -> Result<Vec<String>> {
    let ts = now();
    let mut seq = start_seq;
    let mut added = Vec::new();
    for obs in observations {
        if obs.content.trim().is_empty() {
            continue;
        }
        seq += 1;
        conn.execute(
            "INSERT INTO observations (entity_id, content, optimized_content, sequence_order, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entity_id, obs.content, obs.optimized_content, seq, ts],
        )?;
        added.push(obs.content.clone());
    }
    Ok(added)
}

fn insert_keywords(conn: &Connection, entity_id: i64, keywords: &[KeywordSpec]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO keywords (keyword, entity_id, weight, context) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for kw in keywords {
        stmt.execute(params![kw.keyword, entity_id, kw.weight, kw.context])?;
    }
    Ok(())
}

/// Replace (or initially populate) an entity's cross-reference rows. Target
/// branches are created implicitly; target names are stored unresolved.
fn replace_cross_references(
    conn: &Connection,
    entity_id: i64,
    groups: &[CrossRefInput],
    clear_existing: bool,
) -> Result<()> {
    if clear_existing {
        conn.execute(
            "DELETE FROM cross_references WHERE from_entity_id = ?1",
            params![entity_id],
        )?;
    }
    let ts = now();
    for group in groups {
        let target_branch_id = ensure_branch(conn, &group.memory_branch)?;
        for name in &group.entity_names {
            conn.execute(
                "INSERT OR IGNORE INTO cross_references \
                 (from_entity_id, target_branch_id, target_entity_name, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![entity_id, target_branch_id, name, ts],
            )?;
        }
    }
    Ok(())
}

/// Build an `AND e.status IN (...)` clause from a status slice. Empty means
/// no filtering.
fn status_in_clause(statuses: &[EntityStatus]) -> String {
    if statuses.is_empty() {
        return String::new();
    }
    let list: Vec<String> = statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!(" AND e.status IN ({})", list.join(", "))
}
