//! The orchestrator: public operations over the store with write-path
//! policy applied.
//!
//! [`MemoryService`] owns the connection, the background indexer, and the
//! backup sink. Writes run the text analyzer (aggressive compression,
//! keyword derivation) before reaching the store; entity creation snapshots
//! the branch, enqueues indexing, and optionally auto-creates
//! high-confidence relations. Reads go through the search engine, with
//! similarity-based context expansion for scoped queries.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::db;
use crate::db::MAIN_BRANCH;
use crate::memory::backup;
use crate::memory::error::{MemoryError, Result};
use crate::memory::indexer::{self, IndexTask, IndexerHandle, Priority, RelationSuggestion};
use crate::memory::migrate;
use crate::memory::search::{self, BranchScope, SearchHit};
use crate::memory::similar::{detect_similar, Confidence, SIMILARITY_THRESHOLD};
use crate::memory::store::{self, NewEntity, NewObservation};
use crate::memory::types::{
    Branch, BranchInfo, CrossRefInput, Entity, EntityInput, EntityStatus, GraphExport,
    KeywordSpec, RelationRecord,
};
use crate::text;
use crate::text::optimize::{optimize, CompressionLevel};

/// Default status filter for reads.
pub const DEFAULT_STATUSES: &[EntityStatus] = &[EntityStatus::Active];

// ── Result types ─────────────────────────────────────────────────────────────

/// Outcome of a `create_entities` batch.
#[derive(Debug, Default, Serialize)]
pub struct CreateEntitiesResult {
    pub created: Vec<Entity>,
    /// Per-item failures; the rest of the batch proceeds.
    pub errors: Vec<String>,
    /// Relations auto-created from similarity matches.
    #[serde(rename = "autoRelations")]
    pub auto_relations: Vec<RelationRecord>,
    /// Non-fatal auto-relation failures.
    #[serde(rename = "autoRelationFailures")]
    pub auto_relation_failures: Vec<String>,
}

/// One `add_observations` work item.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationInput {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    pub contents: Vec<String>,
}

/// Per-entity outcome of an `add_observations` batch.
#[derive(Debug, Serialize)]
pub struct AddedObservations {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(rename = "addedObservations")]
    pub added: Vec<String>,
}

/// Outcome of an `add_observations` batch.
#[derive(Debug, Default, Serialize)]
pub struct AddObservationsResult {
    pub results: Vec<AddedObservations>,
    pub errors: Vec<String>,
}

/// Cross-references attached to one result entity.
#[derive(Debug, Serialize)]
pub struct EntityCrossRefs {
    pub entity: String,
    pub references: Vec<CrossRefInput>,
}

/// A scoped search result with optional context expansion.
#[derive(Debug, Default, Serialize)]
pub struct SmartSearchResult {
    pub entities: Vec<SearchHit>,
    pub relations: Vec<RelationRecord>,
    #[serde(rename = "crossReferences", skip_serializing_if = "Vec::is_empty")]
    pub cross_references: Vec<EntityCrossRefs>,
}

/// Entities opened by exact name plus every relation touching them.
#[derive(Debug, Serialize)]
pub struct OpenEntitiesResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<RelationRecord>,
}

/// A whole branch read.
#[derive(Debug, Serialize)]
pub struct BranchRead {
    pub branch: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<RelationRecord>,
    #[serde(rename = "crossReferences", skip_serializing_if = "Vec::is_empty")]
    pub cross_references: Vec<EntityCrossRefs>,
}

/// Outcome of a graph import.
#[derive(Debug, Default, Serialize)]
pub struct ImportResult {
    #[serde(rename = "entitiesCreated")]
    pub entities_created: usize,
    #[serde(rename = "relationsCreated")]
    pub relations_created: usize,
    pub errors: Vec<String>,
}

// ── Service ──────────────────────────────────────────────────────────────────

/// Owns a `MEMORY_PATH` store for the lifetime of the process. Exactly one
/// instance should own a given path at a time.
pub struct MemoryService {
    conn: Arc<Mutex<Connection>>,
    config: MemoryConfig,
    indexer: IndexerHandle,
    indexer_join: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryService {
    /// Open the store, migrate any legacy JSON files, and start the
    /// background indexer. Must be called inside a tokio runtime.
    pub fn open(config: MemoryConfig) -> anyhow::Result<Self> {
        let conn = db::open_database(config.db_path())?;
        let conn = Arc::new(Mutex::new(conn));

        let (indexer, indexer_join) = indexer::spawn(
            Arc::clone(&conn),
            Duration::from_millis(config.indexer.poll_interval_ms),
        );

        let service = Self {
            conn,
            config,
            indexer,
            indexer_join: Some(indexer_join),
        };

        if let Err(e) = service.migrate_legacy_files() {
            warn!(error = %e, "legacy migration failed, continuing with primary store");
        }

        service.indexer.enqueue(IndexTask::rebuild_all());
        Ok(service)
    }

    /// Trim backups, stop the indexer, and close the store.
    pub async fn close(mut self) {
        if let Err(e) =
            backup::trim_backups(&self.config.backups_dir(), self.config.backup.keep_last)
        {
            warn!(error = %e, "backup trim failed during close");
        }
        self.indexer.shutdown();
        if let Some(join) = self.indexer_join.take() {
            let _ = join.await;
        }
        info!("memory service closed");
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection poisoned")
    }

    // ── Branches ─────────────────────────────────────────────────────────────

    pub fn create_branch(&self, name: &str, purpose: Option<&str>) -> Result<Branch> {
        store::create_branch(&self.conn(), name, purpose)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        store::delete_branch(&mut self.conn(), name)
    }

    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        store::list_branches(&self.conn())
    }

    /// Read a whole branch: entities (status-filtered), their relations, and
    /// optionally cross-branch context.
    pub fn read_branch(
        &self,
        branch: Option<&str>,
        statuses: Option<&[EntityStatus]>,
        include_cross_context: bool,
    ) -> Result<BranchRead> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let statuses = statuses.unwrap_or(DEFAULT_STATUSES);

        let conn = self.conn();
        let branch_id = store::require_branch(&conn, branch)?;
        let entities = store::entities_in_branch(&conn, branch_id, statuses, None)?;
        let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
        let relations = store::relations_within(&conn, &ids, Some(branch_id))?;

        let mut cross_references = Vec::new();
        if include_cross_context {
            for entity in &entities {
                let references = store::get_cross_references(&conn, branch, &entity.name)?;
                if !references.is_empty() {
                    cross_references.push(EntityCrossRefs {
                        entity: entity.name.clone(),
                        references,
                    });
                }
            }
        }

        Ok(BranchRead {
            branch: branch.to_string(),
            entities,
            relations,
            cross_references,
        })
    }

    /// Suggest the best branch for new content: substring overlap against
    /// branch names and purposes, plus a small topical rule table. Falls
    /// back to `main`.
    pub fn suggest_branch(
        &self,
        entity_type: Option<&str>,
        content: Option<&str>,
    ) -> Result<String> {
        const DOC_HINTS: &[&str] = &["doc", "docs", "documentation", "spec", "guide"];
        const DEMO_HINTS: &[&str] = &["demo", "example", "sample", "test"];

        let combined = format!(
            "{} {}",
            entity_type.unwrap_or_default(),
            content.unwrap_or_default()
        );
        let tokens = text::tokenize(&combined);
        if tokens.is_empty() {
            return Ok(MAIN_BRANCH.to_string());
        }

        let branches = self.list_branches()?;
        let mut best: Option<(i64, String)> = None;
        for info in branches.iter().filter(|b| b.name != MAIN_BRANCH) {
            let name = info.name.to_lowercase();
            let purpose = info.purpose.to_lowercase();

            let mut score = 0i64;
            for token in &tokens {
                if name.contains(token.as_str()) {
                    score += 2;
                }
                if purpose.contains(token.as_str()) {
                    score += 1;
                }
                if DOC_HINTS.contains(&token.as_str()) && name.contains("doc") {
                    score += 3;
                }
                if DEMO_HINTS.contains(&token.as_str()) && name.contains("demo") {
                    score += 3;
                }
            }

            if score > 0 && best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, info.name.clone()));
            }
        }

        Ok(best.map_or_else(|| MAIN_BRANCH.to_string(), |(_, name)| name))
    }

    // ── Entity write path ────────────────────────────────────────────────────

    /// Create a batch of entities: compress observations, derive keywords,
    /// snapshot the branch, enqueue indexing, and (optionally) auto-create
    /// relations from similarity matches. Per-item failures never abort the
    /// batch.
    pub fn create_entities(
        &self,
        branch: Option<&str>,
        inputs: &[EntityInput],
        auto_create_relations: bool,
    ) -> Result<CreateEntitiesResult> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let mut result = CreateEntitiesResult::default();

        for input in inputs {
            let processed = match process_input(input) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(entity = %input.name, error = %e, "entity rejected");
                    result.errors.push(format!("{}: {e}", input.name));
                    continue;
                }
            };
            match store::create_entity(&mut self.conn(), branch, &processed) {
                Ok(entity) => result.created.push(entity),
                Err(e) => {
                    warn!(entity = %input.name, error = %e, "entity create failed");
                    result.errors.push(format!("{}: {e}", input.name));
                }
            }
        }

        if result.created.is_empty() {
            return Ok(result);
        }

        self.snapshot_branch(branch);

        for entity in &result.created {
            self.indexer.enqueue(IndexTask::index_entity(
                entity.id,
                entity.branch_id,
                Priority::Normal,
            ));
        }

        if auto_create_relations && self.config.indexer.auto_create_relations {
            let created = result.created.clone();
            self.auto_create_relations(branch, &created, &mut result);
        }

        Ok(result)
    }

    /// Run the similarity engine for each created entity against the
    /// branch's active and draft entities, inserting relations for strong
    /// matches. Failures are reported, never fatal.
    fn auto_create_relations(
        &self,
        branch: &str,
        created: &[Entity],
        result: &mut CreateEntitiesResult,
    ) {
        for entity in created {
            let candidates = {
                let conn = self.conn();
                store::entities_in_branch(
                    &conn,
                    entity.branch_id,
                    &[EntityStatus::Active, EntityStatus::Draft],
                    None,
                )
            };
            let candidates = match candidates {
                Ok(candidates) => candidates,
                Err(e) => {
                    result
                        .auto_relation_failures
                        .push(format!("{}: {e}", entity.name));
                    continue;
                }
            };

            let matches = detect_similar(entity, &candidates);
            let records: Vec<RelationRecord> = matches
                .iter()
                .filter(|m| {
                    m.confidence == Confidence::High || m.similarity > SIMILARITY_THRESHOLD
                })
                .map(|m| RelationRecord {
                    from: entity.name.clone(),
                    to: m.entity_name.clone(),
                    relation_type: m.suggested_relation_type.clone(),
                })
                .collect();
            if records.is_empty() {
                continue;
            }

            match store::create_relations(&mut self.conn(), branch, &records) {
                Ok(created_relations) => {
                    debug!(
                        entity = %entity.name,
                        relations = created_relations.len(),
                        "auto-created relations"
                    );
                    result.auto_relations.extend(created_relations);
                }
                Err(e) => {
                    result
                        .auto_relation_failures
                        .push(format!("{}: {e}", entity.name));
                }
            }
        }
    }

    /// Append observations to entities, compressing each at the aggressive
    /// level. Per-item failures never abort the batch.
    pub fn add_observations(
        &self,
        branch: Option<&str>,
        items: &[ObservationInput],
    ) -> Result<AddObservationsResult> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let mut result = AddObservationsResult::default();

        for item in items {
            let observations = compress_observations(&item.contents);
            let outcome = store::add_observations(
                &mut self.conn(),
                branch,
                &item.entity_name,
                &observations,
            );
            match outcome {
                Ok(added) => {
                    // the entity's content changed — re-index
                    let conn = self.conn();
                    if let Some(id) = store::branch_id(&conn, branch)?
                        .and_then(|bid| store::load_entity(&conn, bid, &item.entity_name).ok()?)
                        .map(|e| (e.id, e.branch_id))
                    {
                        self.indexer
                            .enqueue(IndexTask::index_entity(id.0, id.1, Priority::Normal));
                    }
                    result.results.push(AddedObservations {
                        entity_name: item.entity_name.clone(),
                        added,
                    });
                }
                Err(e) => {
                    warn!(entity = %item.entity_name, error = %e, "add_observations failed");
                    result.errors.push(format!("{}: {e}", item.entity_name));
                }
            }
        }
        Ok(result)
    }

    /// Delete observations by exact content.
    pub fn delete_observations(
        &self,
        branch: Option<&str>,
        entity_name: &str,
        contents: &[String],
    ) -> Result<usize> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        store::delete_observations(&mut self.conn(), branch, entity_name, contents)
    }

    /// Load, mutate, and store an entity's status.
    pub fn update_entity_status(
        &self,
        branch: Option<&str>,
        name: &str,
        status: EntityStatus,
        reason: Option<&str>,
    ) -> Result<Entity> {
        let branch = branch.unwrap_or(MAIN_BRANCH);

        let (existing, keywords, cross_references) = {
            let conn = self.conn();
            let branch_id = store::require_branch(&conn, branch)?;
            let existing = store::load_entity(&conn, branch_id, name)?.ok_or_else(|| {
                MemoryError::NotFound(format!("entity '{name}' in branch '{branch}'"))
            })?;
            let keywords = store::keywords_for_entity(&conn, existing.id)?;
            let cross_references = store::get_cross_references(&conn, branch, name)?;
            (existing, keywords, cross_references)
        };

        let updated = NewEntity {
            name: existing.name.clone(),
            entity_type: existing.entity_type.clone(),
            status,
            status_reason: reason.map(str::to_string),
            original_content: existing.original_content.clone(),
            optimized_content: existing.optimized_content.clone(),
            token_count: existing.token_count,
            compression_ratio: existing.compression_ratio,
            observations: existing
                .observations
                .iter()
                .map(|o| NewObservation {
                    content: o.content.clone(),
                    optimized_content: o.optimized_content.clone(),
                })
                .collect(),
            keywords,
            cross_references,
        };

        store::update_entity(&mut self.conn(), branch, &updated)
    }

    /// Delete entities by name; cascades everything attached to them.
    pub fn delete_entities(&self, branch: Option<&str>, names: &[String]) -> Result<Vec<String>> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let deleted = store::delete_entities(&mut self.conn(), branch, names)?;
        if !deleted.is_empty() {
            self.snapshot_branch(branch);
        }
        Ok(deleted)
    }

    // ── Relations & cross-references ─────────────────────────────────────────

    pub fn create_relations(
        &self,
        branch: Option<&str>,
        relations: &[RelationRecord],
    ) -> Result<Vec<RelationRecord>> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        store::create_relations(&mut self.conn(), branch, relations)
    }

    pub fn delete_relations(
        &self,
        branch: Option<&str>,
        relations: &[RelationRecord],
    ) -> Result<usize> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        store::delete_relations(&mut self.conn(), branch, relations)
    }

    pub fn create_cross_references(
        &self,
        source_branch: Option<&str>,
        entity_name: &str,
        target_branch: &str,
        target_names: &[String],
    ) -> Result<Vec<String>> {
        let source_branch = source_branch.unwrap_or(MAIN_BRANCH);
        store::create_cross_references(
            &mut self.conn(),
            source_branch,
            entity_name,
            target_branch,
            target_names,
        )
    }

    pub fn get_cross_references(
        &self,
        branch: Option<&str>,
        entity_name: &str,
    ) -> Result<Vec<CrossRefInput>> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        store::get_cross_references(&self.conn(), branch, entity_name)
    }

    /// Top relationship suggestions maintained by the background indexer.
    pub fn relationship_suggestions(
        &self,
        branch: Option<&str>,
        entity_name: &str,
    ) -> Result<Vec<RelationSuggestion>> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let conn = self.conn();
        let branch_id = store::require_branch(&conn, branch)?;
        let entity = store::load_entity(&conn, branch_id, entity_name)?.ok_or_else(|| {
            MemoryError::NotFound(format!("entity '{entity_name}' in branch '{branch}'"))
        })?;
        drop(conn);
        Ok(self.indexer.suggestions_for(entity.id))
    }

    // ── Read path ────────────────────────────────────────────────────────────

    /// Multi-strategy search with optional context expansion.
    ///
    /// `branch` follows the tool convention: `None` means `main`, `"*"`
    /// means all branches. Expansion (depth ≥ 2) only runs for scoped
    /// searches; depth ≥ 3 additionally attaches cross-branch references.
    pub fn search(
        &self,
        query: &str,
        branch: Option<&str>,
        statuses: Option<&[EntityStatus]>,
        context_depth: Option<u8>,
    ) -> Result<SmartSearchResult> {
        let scope = branch.map_or_else(
            || BranchScope::Branch(MAIN_BRANCH.to_string()),
            BranchScope::from_arg,
        );
        let statuses = statuses.unwrap_or(DEFAULT_STATUSES);
        let depth = context_depth
            .unwrap_or(self.config.retrieval.context_depth)
            .clamp(1, 3);

        let conn = self.conn();
        let response = search::search(&conn, query, &scope, statuses)?;
        drop(conn);

        let mut result = SmartSearchResult {
            entities: response.entities,
            relations: response.relations,
            cross_references: Vec::new(),
        };

        // Expansion is skipped for all-branch searches (cost) and empty hits.
        let BranchScope::Branch(branch_name) = &scope else {
            return Ok(result);
        };
        if result.entities.is_empty() || depth < 2 {
            return Ok(result);
        }

        self.expand_with_similar(branch_name, statuses, &mut result)?;

        if depth >= 3 {
            let conn = self.conn();
            for hit in &result.entities {
                let references =
                    store::get_cross_references(&conn, branch_name, &hit.entity.name)?;
                if !references.is_empty() {
                    result.cross_references.push(EntityCrossRefs {
                        entity: hit.entity.name.clone(),
                        references,
                    });
                }
            }
        }

        Ok(result)
    }

    /// Add high/medium-confidence similar entities (and their relations) to
    /// a scoped search result.
    fn expand_with_similar(
        &self,
        branch: &str,
        statuses: &[EntityStatus],
        result: &mut SmartSearchResult,
    ) -> Result<()> {
        let conn = self.conn();
        let Some(branch_id) = store::branch_id(&conn, branch)? else {
            return Ok(());
        };

        let result_ids: HashSet<i64> = result.entities.iter().map(|h| h.entity.id).collect();
        let candidates: Vec<Entity> = store::entities_in_branch(&conn, branch_id, statuses, None)?
            .into_iter()
            .filter(|e| !result_ids.contains(&e.id))
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let mut added_ids: HashSet<i64> = HashSet::new();
        let mut additions: Vec<SearchHit> = Vec::new();
        for hit in &result.entities {
            for m in detect_similar(&hit.entity, &candidates) {
                if m.confidence < Confidence::Medium || added_ids.contains(&m.entity_id) {
                    continue;
                }
                added_ids.insert(m.entity_id);
                if let Some(entity) = candidates.iter().find(|c| c.id == m.entity_id) {
                    additions.push(SearchHit {
                        entity: entity.clone(),
                        relevance_score: m.similarity,
                        keyword_score: None,
                        fts_score: None,
                        like_score: None,
                    });
                }
            }
        }

        if additions.is_empty() {
            return Ok(());
        }
        debug!(added = additions.len(), branch, "expanded search with similar entities");
        result.entities.extend(additions);
        result.entities.truncate(search::MAX_RESULTS);

        let all_ids: Vec<i64> = result.entities.iter().map(|h| h.entity.id).collect();
        result.relations = store::relations_within(&conn, &all_ids, Some(branch_id))?;
        Ok(())
    }

    /// Open entities by exact name and attach every relation touching them
    /// within the branch.
    pub fn open_entities(
        &self,
        names: &[String],
        branch: Option<&str>,
        statuses: Option<&[EntityStatus]>,
    ) -> Result<OpenEntitiesResult> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let statuses = statuses.unwrap_or(DEFAULT_STATUSES);

        let conn = self.conn();
        let branch_id = store::require_branch(&conn, branch)?;
        let entities = store::entities_by_names(&conn, branch_id, names, statuses)?;
        let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
        let relations = store::relations_incident(&conn, &ids, branch_id)?;
        store::touch_entities(&conn, &ids)?;

        Ok(OpenEntitiesResult {
            entities,
            relations,
        })
    }

    // ── Export / import / migration ──────────────────────────────────────────

    /// Read a branch's whole graph as wire records.
    pub fn export_graph(&self, branch: Option<&str>) -> Result<GraphExport> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        store::branch_records(&self.conn(), branch)
    }

    /// Write a pretty export file for a branch; returns its path.
    pub fn export_to_file(&self, branch: Option<&str>) -> Result<std::path::PathBuf> {
        let branch = branch.unwrap_or(MAIN_BRANCH);
        let graph = self.export_graph(Some(branch))?;
        backup::write_export(&self.config.backups_dir(), branch, &graph)
    }

    /// Import a graph into a branch: entities first, then relations.
    /// Auto-relations stay off so the imported relation set is exactly the
    /// source's.
    pub fn import_graph(&self, branch: Option<&str>, graph: &GraphExport) -> Result<ImportResult> {
        let branch = branch.unwrap_or(MAIN_BRANCH);

        let inputs: Vec<EntityInput> = graph.entities.iter().map(EntityInput::from).collect();
        let entities = self.create_entities(Some(branch), &inputs, false)?;
        let relations = self.create_relations(Some(branch), &graph.relations)?;

        Ok(ImportResult {
            entities_created: entities.created.len(),
            relations_created: relations.len(),
            errors: entities.errors,
        })
    }

    /// Discover and import legacy JSON stores, backing each file up and
    /// renaming it so the migration is one-shot.
    fn migrate_legacy_files(&self) -> Result<()> {
        let files = migrate::discover_legacy_files(&self.config.base_dir())?;
        for file in files {
            let contents = std::fs::read_to_string(&file.path)?;
            backup::write_migration_backup(&self.config.backups_dir(), &file.branch, &contents)?;

            let mut graph = GraphExport::default();
            for record in backup::parse_records(&contents) {
                match record {
                    crate::memory::types::MemoryRecord::Entity(e) => graph.entities.push(e),
                    crate::memory::types::MemoryRecord::Relation(r) => graph.relations.push(r),
                }
            }

            let outcome = self.import_graph(Some(&file.branch), &graph)?;
            info!(
                path = %file.path.display(),
                branch = %file.branch,
                entities = outcome.entities_created,
                relations = outcome.relations_created,
                "legacy store migrated"
            );
            migrate::mark_imported(&file.path)?;
        }
        Ok(())
    }

    /// Write a line-delimited snapshot of a branch to the backup sink.
    /// Failures are logged, never surfaced to the write path.
    fn snapshot_branch(&self, branch: &str) {
        let graph = match store::branch_records(&self.conn(), branch) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(branch, error = %e, "snapshot read failed");
                return;
            }
        };
        if let Err(e) = backup::write_snapshot(&self.config.backups_dir(), branch, &graph) {
            warn!(branch, error = %e, "snapshot write failed");
        }
    }
}

// ── Write-path processing ────────────────────────────────────────────────────

/// Validate and compress an input record into a storable entity.
fn process_input(input: &EntityInput) -> Result<NewEntity> {
    if input.name.trim().is_empty() {
        return Err(MemoryError::Invalid("entity name must not be empty".into()));
    }
    if input.entity_type.trim().is_empty() {
        return Err(MemoryError::Invalid("entity type must not be empty".into()));
    }

    let observations = compress_observations(&input.observations);

    let original_content = input.observations.join("\n");
    let optimized = optimize(&original_content, CompressionLevel::Aggressive);

    let keywords = match &input.keywords {
        Some(keywords) => keywords.clone(),
        None => derive_keywords(input)?,
    };

    Ok(NewEntity {
        name: input.name.trim().to_string(),
        entity_type: input.entity_type.trim().to_string(),
        status: input.status.unwrap_or_default(),
        status_reason: input.status_reason.clone(),
        original_content,
        optimized_content: optimized.optimized,
        token_count: optimized.token_count as i64,
        compression_ratio: optimized.compression_ratio,
        observations,
        keywords,
        cross_references: input.cross_references.clone(),
    })
}

/// Compress each observation at the aggressive level, dropping blanks.
fn compress_observations(contents: &[String]) -> Vec<NewObservation> {
    contents
        .iter()
        .filter(|c| !c.trim().is_empty())
        .map(|content| NewObservation {
            content: content.clone(),
            optimized_content: optimize(content, CompressionLevel::Aggressive).optimized,
        })
        .collect()
}

/// Derive weighted keywords from a JSON rendering of the whole input. The
/// pretty form keeps field values whitespace-separated for the extractor.
fn derive_keywords(input: &EntityInput) -> Result<Vec<KeywordSpec>> {
    let rendered = serde_json::to_string_pretty(input)?;
    let optimized = optimize(&rendered, CompressionLevel::Aggressive);
    Ok(optimized
        .keywords
        .into_iter()
        .map(|kw| KeywordSpec {
            keyword: kw.term,
            weight: kw.score,
            context: Some(input.entity_type.clone()),
        })
        .collect())
}
