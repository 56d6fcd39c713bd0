#![allow(dead_code)]

use engram::config::MemoryConfig;
use engram::memory::types::{EntityInput, RelationRecord};
use engram::memory::MemoryService;
use tempfile::TempDir;

/// Config rooted in a temp directory, with fast indexer polling for tests.
pub fn test_config(dir: &TempDir) -> MemoryConfig {
    let mut config = MemoryConfig::default();
    config.storage.memory_path = dir.path().to_string_lossy().into_owned();
    config.indexer.poll_interval_ms = 50;
    config
}

/// Open a service over a fresh temp directory. Returns the dir guard too —
/// dropping it deletes the store.
pub fn open_service() -> (MemoryService, TempDir) {
    let dir = TempDir::new().unwrap();
    let service = MemoryService::open(test_config(&dir)).unwrap();
    (service, dir)
}

/// Build an entity input with observations.
pub fn entity(name: &str, entity_type: &str, observations: &[&str]) -> EntityInput {
    EntityInput {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        observations: observations.iter().map(|s| s.to_string()).collect(),
        status: None,
        status_reason: None,
        keywords: None,
        cross_references: Vec::new(),
    }
}

/// Build a relation record.
pub fn relation(from: &str, to: &str, relation_type: &str) -> RelationRecord {
    RelationRecord {
        from: from.to_string(),
        to: to.to_string(),
        relation_type: relation_type.to_string(),
    }
}
