mod helpers;

use engram::memory::MemoryService;
use helpers::test_config;
use tempfile::TempDir;

fn legacy_lines() -> String {
    [
        r#"{"type":"entity","name":"Auth","entityType":"Service","observations":["JWT tokens"],"status":"active","lastUpdated":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"entity","name":"Gateway","entityType":"Service","observations":["routes"],"status":"active","lastUpdated":"2026-01-01T00:00:00Z"}"#,
        "not valid json at all",
        r#"{"type":"relation","from":"Gateway","to":"Auth","relationType":"delegates_to"}"#,
    ]
    .join("\n")
}

#[tokio::test]
async fn memory_json_at_base_dir_migrates_into_main() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("memory.json"), legacy_lines()).unwrap();

    let service = MemoryService::open(test_config(&dir)).unwrap();

    let opened = service
        .open_entities(&["Auth".to_string(), "Gateway".to_string()], None, None)
        .unwrap();
    assert_eq!(opened.entities.len(), 2);
    // the bad line was skipped, the relation after it still landed
    assert_eq!(opened.relations.len(), 1);
    assert_eq!(opened.relations[0].relation_type, "delegates_to");

    // source renamed so a restart cannot double-import
    assert!(!dir.path().join("memory.json").exists());
    assert!(dir.path().join("memory.json.imported").exists());

    // a timestamped migration backup was written
    let backups: Vec<String> = std::fs::read_dir(dir.path().join(".memory").join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(backups.iter().any(|name| name.starts_with("migration_main_")));

    service.close().await;
}

#[tokio::test]
async fn branch_json_files_migrate_into_their_branches() {
    let dir = TempDir::new().unwrap();
    let memory_dir = dir.path().join(".memory");
    std::fs::create_dir_all(&memory_dir).unwrap();
    std::fs::write(
        memory_dir.join("frontend.json"),
        r#"{"type":"entity","name":"UserAuthForm","entityType":"Component","observations":["login form"],"status":"active","lastUpdated":""}"#,
    )
    .unwrap();

    let service = MemoryService::open(test_config(&dir)).unwrap();

    let opened = service
        .open_entities(&["UserAuthForm".to_string()], Some("frontend"), None)
        .unwrap();
    assert_eq!(opened.entities.len(), 1);
    assert!(memory_dir.join("frontend.json.imported").exists());

    service.close().await;
}

#[tokio::test]
async fn restart_does_not_duplicate_migrated_entities() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("memory.json"), legacy_lines()).unwrap();

    let service = MemoryService::open(test_config(&dir)).unwrap();
    service.close().await;

    // second startup: the renamed file is ignored, nothing re-imports
    let service = MemoryService::open(test_config(&dir)).unwrap();
    let graph = service.export_graph(None).unwrap();
    assert_eq!(graph.entities.len(), 2);
    assert_eq!(graph.relations.len(), 1);

    service.close().await;
}

#[tokio::test]
async fn clean_startup_without_legacy_files() {
    let dir = TempDir::new().unwrap();
    let service = MemoryService::open(test_config(&dir)).unwrap();

    let graph = service.export_graph(None).unwrap();
    assert!(graph.entities.is_empty());

    service.close().await;
}
