//! Core graph type definitions.
//!
//! Defines [`EntityStatus`] (the entity lifecycle states), the row structs
//! ([`Branch`], [`Entity`], [`Observation`], [`Relation`]), the explicit
//! input records consumed by the orchestrator ([`EntityInput`],
//! [`RelationRecord`], [`CrossRefInput`]), and the wire records used by the
//! line-delimited backup format.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Live and returned by default searches.
    Active,
    /// Superseded but retained for reference.
    Deprecated,
    /// Moved out of the working set.
    Archived,
    /// Not yet confirmed.
    Draft,
}

impl EntityStatus {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
            Self::Draft => "draft",
        }
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "archived" => Ok(Self::Archived),
            "draft" => Ok(Self::Draft),
            _ => Err(format!("unknown entity status: {s}")),
        }
    }
}

/// A branch row — a named partition of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub purpose: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Branch listing entry with aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub purpose: String,
    #[serde(rename = "entityCount")]
    pub entity_count: i64,
    #[serde(rename = "relationCount")]
    pub relation_count: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// An entity row with its ordered observations attached.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(skip)]
    pub branch_id: i64,
    pub status: EntityStatus,
    #[serde(rename = "statusReason", skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(skip)]
    pub original_content: String,
    #[serde(skip)]
    pub optimized_content: String,
    #[serde(rename = "tokenCount")]
    pub token_count: i64,
    #[serde(skip)]
    pub compression_ratio: f64,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(skip)]
    pub last_accessed: String,
    pub observations: Vec<Observation>,
}

/// An observation row — an append-only textual fact.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub entity_id: i64,
    pub content: String,
    #[serde(skip)]
    pub optimized_content: String,
    #[serde(rename = "sequenceOrder")]
    pub sequence_order: i64,
    #[serde(skip)]
    pub created_at: String,
}

/// A relation row — directed typed edge within one branch.
#[derive(Debug, Clone)]
pub struct Relation {
    pub id: i64,
    pub from_entity_id: i64,
    pub to_entity_id: i64,
    pub relation_type: String,
    pub branch_id: i64,
    pub created_at: String,
}

/// A relation identified by entity names — the input and wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRecord {
    pub from: String,
    pub to: String,
    #[serde(rename = "relationType")]
    pub relation_type: String,
}

/// A by-name cross-reference into another branch, grouped per target branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRefInput {
    #[serde(rename = "memoryBranch")]
    pub memory_branch: String,
    #[serde(rename = "entityNames")]
    pub entity_names: Vec<String>,
}

/// A weighted keyword attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSpec {
    pub keyword: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Explicit input record for entity creation — everything the orchestrator
/// accepts from a caller before compression and keyword derivation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInput {
    pub name: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub status: Option<EntityStatus>,
    #[serde(rename = "statusReason", default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<KeywordSpec>>,
    #[serde(rename = "crossReferences", default)]
    pub cross_references: Vec<CrossRefInput>,
}

/// Entity as written to line-delimited backups and pretty exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(rename = "statusReason", default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: String,
    #[serde(rename = "crossReferences", default, skip_serializing_if = "Vec::is_empty")]
    pub cross_references: Vec<CrossRefInput>,
}

/// One line of the line-delimited JSON backup format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemoryRecord {
    Entity(EntityRecord),
    Relation(RelationRecord),
}

/// A whole-branch graph fragment, as returned by export and accepted by
/// import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub entities: Vec<EntityRecord>,
    pub relations: Vec<RelationRecord>,
}

impl EntityRecord {
    /// Build a wire record from a loaded entity and its cross-references.
    pub fn from_entity(entity: &Entity, cross_references: Vec<CrossRefInput>) -> Self {
        Self {
            name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
            observations: entity
                .observations
                .iter()
                .map(|o| o.content.clone())
                .collect(),
            status: entity.status,
            status_reason: entity.status_reason.clone(),
            last_updated: entity.updated_at.clone(),
            cross_references,
        }
    }
}

impl From<&EntityRecord> for EntityInput {
    fn from(record: &EntityRecord) -> Self {
        Self {
            name: record.name.clone(),
            entity_type: record.entity_type.clone(),
            observations: record.observations.clone(),
            status: Some(record.status),
            status_reason: record.status_reason.clone(),
            keywords: None,
            cross_references: record.cross_references.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            EntityStatus::Active,
            EntityStatus::Deprecated,
            EntityStatus::Archived,
            EntityStatus::Draft,
        ] {
            let parsed: EntityStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("unknown".parse::<EntityStatus>().is_err());
    }

    #[test]
    fn status_defaults_to_active() {
        assert_eq!(EntityStatus::default(), EntityStatus::Active);
    }

    #[test]
    fn memory_record_line_format() {
        let line = r#"{"type":"entity","name":"Auth","entityType":"Service","observations":["JWT tokens"],"status":"active","lastUpdated":"2026-01-01T00:00:00Z"}"#;
        let record: MemoryRecord = serde_json::from_str(line).unwrap();
        match record {
            MemoryRecord::Entity(e) => {
                assert_eq!(e.name, "Auth");
                assert_eq!(e.entity_type, "Service");
                assert_eq!(e.observations, vec!["JWT tokens"]);
                assert_eq!(e.status, EntityStatus::Active);
            }
            MemoryRecord::Relation(_) => panic!("expected entity record"),
        }

        let line = r#"{"type":"relation","from":"A","to":"B","relationType":"uses"}"#;
        let record: MemoryRecord = serde_json::from_str(line).unwrap();
        match record {
            MemoryRecord::Relation(r) => {
                assert_eq!(r.from, "A");
                assert_eq!(r.to, "B");
                assert_eq!(r.relation_type, "uses");
            }
            MemoryRecord::Entity(_) => panic!("expected relation record"),
        }
    }

    #[test]
    fn entity_record_serializes_wire_names() {
        let record = EntityRecord {
            name: "Auth".into(),
            entity_type: "Service".into(),
            observations: vec!["JWT tokens".into()],
            status: EntityStatus::Draft,
            status_reason: None,
            last_updated: "2026-01-01T00:00:00Z".into(),
            cross_references: vec![CrossRefInput {
                memory_branch: "backend".into(),
                entity_names: vec!["AuthenticationAPI".into()],
            }],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entityType"], "Service");
        assert_eq!(json["status"], "draft");
        assert_eq!(json["crossReferences"][0]["memoryBranch"], "backend");
        assert!(json.get("statusReason").is_none());
    }
}
