//! Backup sink: line-delimited branch snapshots, pretty JSON exports,
//! migration backups, and trimming.
//!
//! All files live under `<MEMORY_PATH>/.memory/backups/`. Timestamps in
//! filenames are filename-safe RFC 3339 (`2026-08-02T12-30-45-123Z`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::memory::error::Result;
use crate::memory::types::{EntityRecord, GraphExport, MemoryRecord, RelationRecord};

/// How many backups of each kind to keep after a trim.
pub const DEFAULT_KEEP: usize = 5;

/// Filename-safe UTC timestamp: colons and dots replaced with dashes.
pub fn timestamp_slug() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Pretty export document schema.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub branch: String,
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
    pub stats: ExportStats,
    pub entities: Vec<EntityRecord>,
    pub relations: Vec<RelationRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportStats {
    #[serde(rename = "entityCount")]
    pub entity_count: usize,
    #[serde(rename = "relationCount")]
    pub relation_count: usize,
}

/// Write a line-delimited snapshot `<branch>_<ts>.json`. One record per
/// line: entities first, then relations.
pub fn write_snapshot(backups_dir: &Path, branch: &str, graph: &GraphExport) -> Result<PathBuf> {
    fs::create_dir_all(backups_dir)?;
    let path = backups_dir.join(format!("{branch}_{}.json", timestamp_slug()));

    let mut file = fs::File::create(&path)?;
    for entity in &graph.entities {
        let line = serde_json::to_string(&MemoryRecord::Entity(entity.clone()))?;
        writeln!(file, "{line}")?;
    }
    for relation in &graph.relations {
        let line = serde_json::to_string(&MemoryRecord::Relation(relation.clone()))?;
        writeln!(file, "{line}")?;
    }

    tracing::debug!(path = %path.display(), branch, "branch snapshot written");
    Ok(path)
}

/// Write a pretty export `export_<branch>_<ts>.json`.
pub fn write_export(backups_dir: &Path, branch: &str, graph: &GraphExport) -> Result<PathBuf> {
    fs::create_dir_all(backups_dir)?;
    let path = backups_dir.join(format!("export_{branch}_{}.json", timestamp_slug()));

    let document = ExportDocument {
        branch: branch.to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        stats: ExportStats {
            entity_count: graph.entities.len(),
            relation_count: graph.relations.len(),
        },
        entities: graph.entities.clone(),
        relations: graph.relations.clone(),
    };
    fs::write(&path, serde_json::to_string_pretty(&document)?)?;

    tracing::info!(path = %path.display(), branch, "export written");
    Ok(path)
}

/// Copy a legacy source file into `migration_<branch>_<ts>.json` before its
/// records are imported.
pub fn write_migration_backup(
    backups_dir: &Path,
    branch: &str,
    source_contents: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(backups_dir)?;
    let path = backups_dir.join(format!("migration_{branch}_{}.json", timestamp_slug()));
    fs::write(&path, source_contents)?;
    Ok(path)
}

/// Parse line-delimited JSON records. Lines that fail to parse are skipped
/// with a warning.
pub fn parse_records(contents: &str) -> Vec<MemoryRecord> {
    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MemoryRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping unparseable record");
            }
        }
    }
    records
}

/// Read a graph from disk: pretty export documents and line-delimited
/// snapshots are both accepted.
pub fn read_graph(path: &Path) -> Result<GraphExport> {
    let contents = fs::read_to_string(path)?;

    if let Ok(document) = serde_json::from_str::<ExportDocument>(&contents) {
        return Ok(GraphExport {
            entities: document.entities,
            relations: document.relations,
        });
    }

    let mut graph = GraphExport::default();
    for record in parse_records(&contents) {
        match record {
            MemoryRecord::Entity(e) => graph.entities.push(e),
            MemoryRecord::Relation(r) => graph.relations.push(r),
        }
    }
    Ok(graph)
}

/// Trim backups to the newest `keep` per kind, where a kind is the filename
/// prefix before the timestamp. Returns the number of files removed.
pub fn trim_backups(backups_dir: &Path, keep: usize) -> Result<usize> {
    if !backups_dir.exists() {
        return Ok(0);
    }

    let mut groups: std::collections::HashMap<String, Vec<PathBuf>> =
        std::collections::HashMap::new();
    for entry in fs::read_dir(backups_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // prefix before the trailing `_<timestamp>`
        let prefix = stem
            .rsplit_once('_')
            .map_or(stem, |(prefix, _)| prefix)
            .to_string();
        groups.entry(prefix).or_default().push(path);
    }

    let mut removed = 0;
    for (_, mut paths) in groups {
        // timestamp slugs sort lexicographically; newest first
        paths.sort();
        paths.reverse();
        for stale in paths.into_iter().skip(keep) {
            fs::remove_file(&stale)?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(removed, keep, "trimmed old backups");
    }
    Ok(removed)
}
