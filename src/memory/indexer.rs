//! Background relationship indexer.
//!
//! A single-consumer task queue drained at a fixed polling interval (one
//! task per tick). The indexer maintains an in-memory entry per entity with
//! its keyword set and relationship suggestions; auto-creation of relations
//! happens on the orchestrator write path, never here. Task failures are
//! logged and swallowed — background errors must not reach foreground
//! callers.

use rusqlite::Connection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::memory::similar::{detect_similar, Confidence};
use crate::memory::store;
use crate::text;

/// Suggestion confidence at or above which a relation is auto-creatable.
pub const AUTO_RELATION_THRESHOLD: f64 = 0.78;

/// How many same-branch entities one detection pass considers.
const DETECT_BATCH_LIMIT: usize = 20;

/// How many entities per branch the initial rebuild enqueues.
const REBUILD_BRANCH_LIMIT: usize = 50;

/// Queue capacity for incoming tasks.
const QUEUE_CAPACITY: usize = 256;

/// Maximum suggestions returned per entity.
const MAX_SUGGESTIONS: usize = 10;

// ── Tasks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Extract an entity's keyword set, then queue relationship detection.
    IndexEntity,
    /// Re-score an entity against its branch and refresh suggestions.
    DetectRelationships,
    /// Initial build: enqueue indexing for every branch's entities.
    RebuildAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// One unit of background work.
#[derive(Debug, Clone)]
pub struct IndexTask {
    pub kind: TaskKind,
    pub entity_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub priority: Priority,
}

impl IndexTask {
    pub fn index_entity(entity_id: i64, branch_id: i64, priority: Priority) -> Self {
        Self {
            kind: TaskKind::IndexEntity,
            entity_id: Some(entity_id),
            branch_id: Some(branch_id),
            priority,
        }
    }

    pub fn detect_relationships(entity_id: i64, branch_id: i64) -> Self {
        Self {
            kind: TaskKind::DetectRelationships,
            entity_id: Some(entity_id),
            branch_id: Some(branch_id),
            priority: Priority::Normal,
        }
    }

    pub fn rebuild_all() -> Self {
        Self {
            kind: TaskKind::RebuildAll,
            entity_id: None,
            branch_id: None,
            priority: Priority::Low,
        }
    }

    fn dedup_key(&self) -> (TaskKind, Option<i64>, Option<i64>) {
        (self.kind, self.entity_id, self.branch_id)
    }
}

// ── Index state ──────────────────────────────────────────────────────────────

/// A relationship suggestion retained for an entity.
#[derive(Debug, Clone)]
pub struct RelationSuggestion {
    pub target_entity_id: i64,
    pub target_name: String,
    pub relation_type: String,
    pub similarity: f64,
    pub confidence: Confidence,
    pub is_auto_creatable: bool,
}

/// Per-entity index entry.
#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    pub keywords: HashSet<String>,
    pub similarity_scores: Vec<(i64, f64)>,
    pub suggested_relations: Vec<RelationSuggestion>,
    pub last_indexed: String,
}

type SharedState = Arc<Mutex<HashMap<i64, IndexEntry>>>;

// ── Priority queue with duplicate suppression ────────────────────────────────

/// FIFO per priority; enqueueing a task whose `(kind, entity, branch)` is
/// already pending is a no-op.
#[derive(Default)]
struct TaskQueue {
    high: VecDeque<IndexTask>,
    normal: VecDeque<IndexTask>,
    low: VecDeque<IndexTask>,
    pending: HashSet<(TaskKind, Option<i64>, Option<i64>)>,
}

impl TaskQueue {
    fn push(&mut self, task: IndexTask) {
        if !self.pending.insert(task.dedup_key()) {
            debug!(?task, "duplicate task suppressed");
            return;
        }
        match task.priority {
            Priority::High => self.high.push_back(task),
            Priority::Normal => self.normal.push_back(task),
            Priority::Low => self.low.push_back(task),
        }
    }

    fn pop(&mut self) -> Option<IndexTask> {
        let task = self
            .high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())?;
        self.pending.remove(&task.dedup_key());
        Some(task)
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable handle to the running indexer.
#[derive(Clone)]
pub struct IndexerHandle {
    task_tx: mpsc::Sender<IndexTask>,
    state: SharedState,
    shutdown: CancellationToken,
}

impl IndexerHandle {
    /// Enqueue a background task. Never blocks; drops with a warning when
    /// the queue is saturated.
    pub fn enqueue(&self, task: IndexTask) {
        if let Err(e) = self.task_tx.try_send(task) {
            warn!(error = %e, "indexer queue rejected task");
        }
    }

    /// Top suggestions for an entity, best confidence first.
    pub fn suggestions_for(&self, entity_id: i64) -> Vec<RelationSuggestion> {
        let state = self.state.lock().expect("indexer state poisoned");
        let mut suggestions = state
            .get(&entity_id)
            .map(|entry| entry.suggested_relations.clone())
            .unwrap_or_default();
        suggestions.sort_by(|a, b| {
            b.confidence.cmp(&a.confidence).then(
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }

    /// The full index entry for an entity, if it has been indexed.
    pub fn entry_for(&self, entity_id: i64) -> Option<IndexEntry> {
        self.state
            .lock()
            .expect("indexer state poisoned")
            .get(&entity_id)
            .cloned()
    }

    /// Signal the worker to stop after its current task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

// ── Worker ───────────────────────────────────────────────────────────────────

/// Spawn the indexer worker. Returns the handle and the join handle of the
/// background task.
pub fn spawn(
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
) -> (IndexerHandle, tokio::task::JoinHandle<()>) {
    let (task_tx, task_rx) = mpsc::channel(QUEUE_CAPACITY);
    let state: SharedState = Arc::new(Mutex::new(HashMap::new()));
    let shutdown = CancellationToken::new();

    let handle = IndexerHandle {
        task_tx,
        state: Arc::clone(&state),
        shutdown: shutdown.clone(),
    };

    let worker = Worker {
        conn,
        state,
        shutdown,
        poll_interval,
    };
    let join = tokio::spawn(worker.run(task_rx));

    (handle, join)
}

struct Worker {
    conn: Arc<Mutex<Connection>>,
    state: SharedState,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl Worker {
    /// Run until shutdown: accept tasks continuously, execute one per tick.
    async fn run(self, mut task_rx: mpsc::Receiver<IndexTask>) {
        let mut queue = TaskQueue::default();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(poll_interval = ?self.poll_interval, "indexer running");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(dropped = queue.len(), "indexer shutting down");
                    break;
                }

                Some(task) = task_rx.recv() => {
                    queue.push(task);
                }

                _ = interval.tick() => {
                    if let Some(task) = queue.pop() {
                        match self.run_task(&task) {
                            Ok(follow_ups) => {
                                for follow_up in follow_ups {
                                    queue.push(follow_up);
                                }
                            }
                            Err(e) => {
                                warn!(?task, error = %e, "background task failed");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Execute one task; returns follow-up tasks to enqueue locally.
    fn run_task(&self, task: &IndexTask) -> crate::memory::error::Result<Vec<IndexTask>> {
        match task.kind {
            TaskKind::IndexEntity => self.index_entity(task),
            TaskKind::DetectRelationships => self.detect_relationships(task),
            TaskKind::RebuildAll => self.rebuild_all(),
        }
    }

    /// Extract an entity's keyword set and store its index entry.
    fn index_entity(&self, task: &IndexTask) -> crate::memory::error::Result<Vec<IndexTask>> {
        let (Some(entity_id), Some(branch_id)) = (task.entity_id, task.branch_id) else {
            return Ok(Vec::new());
        };

        let conn = self.conn.lock().expect("connection poisoned");
        let Some(entity) = store::entities_by_ids(&conn, &[entity_id])?.into_iter().next() else {
            debug!(entity_id, "index skipped: entity gone");
            return Ok(Vec::new());
        };
        drop(conn);

        let mut keywords: HashSet<String> = HashSet::new();
        keywords.extend(text::tokenize(&entity.entity_type));
        keywords.extend(text::tokenize(&entity.name));
        for obs in &entity.observations {
            keywords.extend(text::tokenize(&obs.content));
        }

        let mut state = self.state.lock().expect("indexer state poisoned");
        let entry = state.entry(entity_id).or_default();
        entry.keywords = keywords;
        entry.last_indexed = chrono::Utc::now().to_rfc3339();
        drop(state);

        debug!(entity_id, "entity indexed");
        Ok(vec![IndexTask::detect_relationships(entity_id, branch_id)])
    }

    /// Re-score an entity against up to [`DETECT_BATCH_LIMIT`] same-branch
    /// entities and refresh its suggestions.
    fn detect_relationships(
        &self,
        task: &IndexTask,
    ) -> crate::memory::error::Result<Vec<IndexTask>> {
        let (Some(entity_id), Some(branch_id)) = (task.entity_id, task.branch_id) else {
            return Ok(Vec::new());
        };

        let conn = self.conn.lock().expect("connection poisoned");
        let Some(entity) = store::entities_by_ids(&conn, &[entity_id])?.into_iter().next() else {
            return Ok(Vec::new());
        };
        let candidates: Vec<_> = store::entities_in_branch(
            &conn,
            branch_id,
            &[],
            Some(DETECT_BATCH_LIMIT + 1),
        )?
        .into_iter()
        .filter(|c| c.id != entity_id)
        .take(DETECT_BATCH_LIMIT)
        .collect();
        drop(conn);

        let matches = detect_similar(&entity, &candidates);

        let mut state = self.state.lock().expect("indexer state poisoned");
        let entry = state.entry(entity_id).or_default();
        entry.similarity_scores = matches.iter().map(|m| (m.entity_id, m.similarity)).collect();
        entry.suggested_relations = matches
            .iter()
            .filter(|m| m.confidence >= Confidence::Medium)
            .map(|m| RelationSuggestion {
                target_entity_id: m.entity_id,
                target_name: m.entity_name.clone(),
                relation_type: m.suggested_relation_type.clone(),
                similarity: m.similarity,
                confidence: m.confidence,
                is_auto_creatable: m.similarity >= AUTO_RELATION_THRESHOLD,
            })
            .collect();
        entry.last_indexed = chrono::Utc::now().to_rfc3339();

        debug!(
            entity_id,
            suggestions = entry.suggested_relations.len(),
            "relationships detected"
        );
        Ok(Vec::new())
    }

    /// Enqueue indexing for the first entities of every branch.
    fn rebuild_all(&self) -> crate::memory::error::Result<Vec<IndexTask>> {
        let conn = self.conn.lock().expect("connection poisoned");
        let branch_ids = store::all_branch_ids(&conn)?;

        let mut follow_ups = Vec::new();
        for branch_id in branch_ids {
            let entities =
                store::entities_in_branch(&conn, branch_id, &[], Some(REBUILD_BRANCH_LIMIT))?;
            for entity in entities {
                follow_ups.push(IndexTask::index_entity(entity.id, branch_id, Priority::Low));
            }
        }
        info!(queued = follow_ups.len(), "initial index rebuild queued");
        Ok(follow_ups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{create_entity, NewEntity, NewObservation};
    use crate::memory::types::EntityStatus;

    fn shared_db() -> Arc<Mutex<Connection>> {
        Arc::new(Mutex::new(db::open_memory_database().unwrap()))
    }

    fn seed(conn: &Arc<Mutex<Connection>>, branch: &str, name: &str, obs: &[&str]) -> i64 {
        let mut guard = conn.lock().unwrap();
        let entity = NewEntity {
            name: name.to_string(),
            entity_type: "component".to_string(),
            status: EntityStatus::Active,
            original_content: obs.join("\n"),
            optimized_content: obs.join("\n"),
            observations: obs
                .iter()
                .map(|o| NewObservation {
                    content: o.to_string(),
                    optimized_content: o.to_string(),
                })
                .collect(),
            ..Default::default()
        };
        create_entity(&mut guard, branch, &entity).unwrap().id
    }

    // ── Queue unit tests ─────────────────────────────────────────────────────

    #[test]
    fn queue_is_fifo_per_priority() {
        let mut queue = TaskQueue::default();
        queue.push(IndexTask::index_entity(1, 1, Priority::Low));
        queue.push(IndexTask::index_entity(2, 1, Priority::Normal));
        queue.push(IndexTask::index_entity(3, 1, Priority::High));
        queue.push(IndexTask::index_entity(4, 1, Priority::High));

        let order: Vec<i64> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.entity_id.unwrap())
            .collect();
        assert_eq!(order, vec![3, 4, 2, 1]);
    }

    #[test]
    fn queue_suppresses_duplicates() {
        let mut queue = TaskQueue::default();
        queue.push(IndexTask::index_entity(1, 1, Priority::Normal));
        queue.push(IndexTask::index_entity(1, 1, Priority::Normal));
        assert_eq!(queue.len(), 1);

        // different kind with the same entity is NOT a duplicate
        queue.push(IndexTask::detect_relationships(1, 1));
        assert_eq!(queue.len(), 2);

        // popping clears the pending key so the task can be re-queued
        queue.pop().unwrap();
        queue.push(IndexTask::index_entity(1, 1, Priority::Normal));
        assert_eq!(queue.len(), 2);
    }

    // ── Worker integration tests ─────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn index_entity_builds_keywords_then_suggestions() {
        let conn = shared_db();
        let id_a = seed(&conn, "main", "Dashboard Grid", &["renders the dashboard layout"]);
        let _id_b = seed(&conn, "main", "Dashboard Grid Panel", &["renders the dashboard layout"]);

        let (handle, join) = spawn(Arc::clone(&conn), Duration::from_secs(2));
        handle.enqueue(IndexTask::index_entity(id_a, 1, Priority::High));

        // two ticks: one for IndexEntity, one for the follow-up detection
        tokio::time::sleep(Duration::from_secs(7)).await;

        let entry = handle.entry_for(id_a).expect("entity should be indexed");
        assert!(entry.keywords.contains("dashboard"));
        assert!(entry.keywords.contains("grid"));
        assert!(entry.keywords.contains("component"));
        assert!(!entry.keywords.contains("the"));
        assert!(!entry.similarity_scores.is_empty());
        assert!(!entry.suggested_relations.is_empty());
        let suggestion = &entry.suggested_relations[0];
        assert_eq!(suggestion.target_name, "Dashboard Grid Panel");

        handle.shutdown();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_all_indexes_every_branch() {
        let conn = shared_db();
        let id_a = seed(&conn, "main", "Alpha", &["alpha facts"]);
        let id_b = seed(&conn, "docs", "Beta", &["beta facts"]);

        let (handle, join) = spawn(Arc::clone(&conn), Duration::from_secs(2));
        handle.enqueue(IndexTask::rebuild_all());

        // rebuild + 2 index tasks + 2 detection tasks
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert!(handle.entry_for(id_a).is_some());
        assert!(handle.entry_for(id_b).is_some());

        handle.shutdown();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn task_failures_do_not_kill_the_worker() {
        let conn = shared_db();
        let (handle, join) = spawn(Arc::clone(&conn), Duration::from_secs(2));

        // entity 999 does not exist — the task is a no-op, not a crash
        handle.enqueue(IndexTask::index_entity(999, 1, Priority::Normal));
        tokio::time::sleep(Duration::from_secs(5)).await;

        let id = seed(&conn, "main", "Gamma", &["gamma facts"]);
        handle.enqueue(IndexTask::index_entity(id, 1, Priority::Normal));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(handle.entry_for(id).is_some());

        handle.shutdown();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn suggestions_ranked_by_confidence() {
        let conn = shared_db();
        let target = seed(&conn, "main", "Payment Service", &["handles payments"]);
        let _close = seed(&conn, "main", "Payment Service Core", &["handles payments"]);
        let _far = seed(&conn, "main", "Payments Service", &["handles payments"]);

        let (handle, join) = spawn(Arc::clone(&conn), Duration::from_secs(2));
        handle.enqueue(IndexTask::index_entity(target, 1, Priority::High));
        tokio::time::sleep(Duration::from_secs(7)).await;

        let suggestions = handle.suggestions_for(target);
        assert!(!suggestions.is_empty());
        for pair in suggestions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }

        handle.shutdown();
        join.await.unwrap();
    }
}
