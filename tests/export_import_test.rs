mod helpers;

use engram::memory::types::EntityStatus;
use helpers::{entity, open_service, relation};
use std::collections::BTreeSet;

#[tokio::test]
async fn export_import_round_trip_preserves_the_graph() {
    let (service, _dir) = open_service();

    let mut deprecated = entity("OldAuth", "Service", &["basic auth"]);
    deprecated.status = Some(EntityStatus::Deprecated);
    deprecated.status_reason = Some("replaced".into());

    service
        .create_entities(
            Some("source"),
            &[
                entity("Auth", "Service", &["JWT tokens", "bcrypt"]),
                entity("Gateway", "Service", &["routes requests"]),
                deprecated,
            ],
            false,
        )
        .unwrap();
    service
        .create_relations(
            Some("source"),
            &[
                relation("Gateway", "Auth", "delegates_to"),
                relation("Auth", "OldAuth", "replaces"),
            ],
        )
        .unwrap();

    let exported = service.export_graph(Some("source")).unwrap();
    assert_eq!(exported.entities.len(), 3);
    assert_eq!(exported.relations.len(), 2);

    let outcome = service.import_graph(Some("copy"), &exported).unwrap();
    assert_eq!(outcome.entities_created, 3);
    assert_eq!(outcome.relations_created, 2);
    assert!(outcome.errors.is_empty());

    let reexported = service.export_graph(Some("copy")).unwrap();

    // entity multiset matches on name, type, status, and observations
    let summarize = |graph: &engram::memory::types::GraphExport| -> BTreeSet<String> {
        graph
            .entities
            .iter()
            .map(|e| {
                format!(
                    "{}|{}|{:?}|{:?}|{:?}",
                    e.name, e.entity_type, e.status, e.status_reason, e.observations
                )
            })
            .collect()
    };
    assert_eq!(summarize(&exported), summarize(&reexported));

    let relations = |graph: &engram::memory::types::GraphExport| -> BTreeSet<String> {
        graph
            .relations
            .iter()
            .map(|r| format!("{}|{}|{}", r.from, r.relation_type, r.to))
            .collect()
    };
    assert_eq!(relations(&exported), relations(&reexported));

    service.close().await;
}

#[tokio::test]
async fn cross_references_survive_the_round_trip() {
    let (service, _dir) = open_service();

    service
        .create_entities(Some("backend"), &[entity("Api", "Service", &[])], false)
        .unwrap();
    service
        .create_entities(Some("source"), &[entity("Spec", "Document", &["api spec"])], false)
        .unwrap();
    service
        .create_cross_references(Some("source"), "Spec", "backend", &["Api".to_string()])
        .unwrap();

    let exported = service.export_graph(Some("source")).unwrap();
    assert_eq!(exported.entities[0].cross_references.len(), 1);

    service.import_graph(Some("copy"), &exported).unwrap();
    let groups = service.get_cross_references(Some("copy"), "Spec").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].memory_branch, "backend");
    assert_eq!(groups[0].entity_names, vec!["Api"]);

    service.close().await;
}

#[tokio::test]
async fn import_skips_duplicates_but_continues() {
    let (service, _dir) = open_service();

    service
        .create_entities(None, &[entity("Existing", "T", &["already here"])], false)
        .unwrap();

    let graph = engram::memory::types::GraphExport {
        entities: vec![
            engram::memory::types::EntityRecord {
                name: "Existing".into(),
                entity_type: "T".into(),
                observations: vec!["duplicate".into()],
                status: EntityStatus::Active,
                status_reason: None,
                last_updated: String::new(),
                cross_references: Vec::new(),
            },
            engram::memory::types::EntityRecord {
                name: "Fresh".into(),
                entity_type: "T".into(),
                observations: vec!["new".into()],
                status: EntityStatus::Active,
                status_reason: None,
                last_updated: String::new(),
                cross_references: Vec::new(),
            },
        ],
        relations: Vec::new(),
    };

    let outcome = service.import_graph(None, &graph).unwrap();
    assert_eq!(outcome.entities_created, 1);
    assert_eq!(outcome.errors.len(), 1);

    service.close().await;
}

#[tokio::test]
async fn export_writes_pretty_document_to_backups() {
    let (service, dir) = open_service();

    service
        .create_entities(None, &[entity("Auth", "Service", &["JWT"])], false)
        .unwrap();

    let path = service.export_to_file(None).unwrap();
    assert!(path.starts_with(dir.path().join(".memory").join("backups")));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("export_main_"));
    assert!(name.ends_with(".json"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["branch"], "main");
    assert_eq!(parsed["stats"]["entityCount"], 1);
    assert!(parsed["exportedAt"].is_string());

    service.close().await;
}
