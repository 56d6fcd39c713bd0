mod helpers;

use helpers::{entity, open_service, relation};

#[tokio::test]
async fn relation_dedup_and_cascade() {
    let (service, _dir) = open_service();

    service
        .create_entities(None, &[entity("A", "Service", &[]), entity("B", "Service", &[])], false)
        .unwrap();

    // the same relation twice in one batch yields a single row
    let created = service
        .create_relations(
            None,
            &[relation("A", "B", "uses"), relation("A", "B", "uses")],
        )
        .unwrap();
    assert_eq!(created.len(), 1);

    // re-issuing the batch is a no-op with empty additions
    let again = service
        .create_relations(None, &[relation("A", "B", "uses")])
        .unwrap();
    assert!(again.is_empty());

    // deleting an endpoint removes the relation, the peer survives
    service.delete_entities(None, &["A".to_string()]).unwrap();
    let opened = service
        .open_entities(&["A".to_string(), "B".to_string()], None, None)
        .unwrap();
    assert_eq!(opened.entities.len(), 1);
    assert_eq!(opened.entities[0].name, "B");
    assert!(opened.relations.is_empty());

    service.close().await;
}

#[tokio::test]
async fn relations_with_missing_endpoints_are_skipped() {
    let (service, _dir) = open_service();

    service
        .create_entities(None, &[entity("A", "Service", &[])], false)
        .unwrap();

    let created = service
        .create_relations(
            None,
            &[relation("A", "Ghost", "uses"), relation("Ghost", "A", "uses")],
        )
        .unwrap();
    assert!(created.is_empty());

    service.close().await;
}

#[tokio::test]
async fn same_endpoints_different_types_coexist() {
    let (service, _dir) = open_service();

    service
        .create_entities(None, &[entity("A", "T", &[]), entity("B", "T", &[])], false)
        .unwrap();

    let created = service
        .create_relations(
            None,
            &[relation("A", "B", "uses"), relation("A", "B", "extends")],
        )
        .unwrap();
    assert_eq!(created.len(), 2);

    service.close().await;
}

#[tokio::test]
async fn delete_relations_by_key() {
    let (service, _dir) = open_service();

    service
        .create_entities(None, &[entity("A", "T", &[]), entity("B", "T", &[])], false)
        .unwrap();
    service
        .create_relations(None, &[relation("A", "B", "uses")])
        .unwrap();

    assert_eq!(
        service.delete_relations(None, &[relation("A", "B", "uses")]).unwrap(),
        1
    );
    // absent key is a no-op
    assert_eq!(
        service.delete_relations(None, &[relation("A", "B", "uses")]).unwrap(),
        0
    );

    service.close().await;
}

#[tokio::test]
async fn open_entities_attaches_incident_relations_once() {
    let (service, _dir) = open_service();

    service
        .create_entities(
            None,
            &[
                entity("Hub", "Service", &[]),
                entity("SpokeA", "Service", &[]),
                entity("SpokeB", "Service", &[]),
            ],
            false,
        )
        .unwrap();
    service
        .create_relations(
            None,
            &[
                relation("Hub", "SpokeA", "feeds"),
                relation("Hub", "SpokeB", "feeds"),
                relation("SpokeA", "SpokeB", "peers"),
            ],
        )
        .unwrap();

    // opening both spokes returns each incident relation exactly once
    let opened = service
        .open_entities(&["SpokeA".to_string(), "SpokeB".to_string()], None, None)
        .unwrap();
    assert_eq!(opened.entities.len(), 2);
    assert_eq!(opened.relations.len(), 3);

    service.close().await;
}

#[tokio::test]
async fn cross_references_resolve_lazily() {
    let (service, _dir) = open_service();

    service
        .create_entities(Some("frontend"), &[entity("UserAuthForm", "Component", &[])], false)
        .unwrap();
    service
        .create_entities(Some("backend"), &[entity("AuthenticationAPI", "Service", &[])], false)
        .unwrap();

    // present target is linked, missing target silently skipped
    let added = service
        .create_cross_references(
            Some("frontend"),
            "UserAuthForm",
            "backend",
            &["AuthenticationAPI".to_string(), "NotYetBuilt".to_string()],
        )
        .unwrap();
    assert_eq!(added, vec!["AuthenticationAPI"]);

    let groups = service
        .get_cross_references(Some("frontend"), "UserAuthForm")
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].memory_branch, "backend");
    assert_eq!(groups[0].entity_names, vec!["AuthenticationAPI"]);

    service.close().await;
}
