use anyhow::{Context, Result};

use engram::config::MemoryConfig;
use engram::db;
use engram::memory::backup::{ExportDocument, ExportStats};
use engram::memory::store;

/// Export a branch as pretty JSON to stdout, or into the backups directory
/// with `--to-file`.
pub fn run(config: &MemoryConfig, branch: Option<&str>, to_file: bool) -> Result<()> {
    let branch = branch.unwrap_or(db::MAIN_BRANCH);
    let conn = db::open_database(config.db_path())?;
    let graph = store::branch_records(&conn, branch)
        .with_context(|| format!("failed to read branch '{branch}'"))?;

    if to_file {
        let path = engram::memory::backup::write_export(&config.backups_dir(), branch, &graph)?;
        eprintln!("Export written to {}", path.display());
        return Ok(());
    }

    let document = ExportDocument {
        branch: branch.to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        stats: ExportStats {
            entity_count: graph.entities.len(),
            relation_count: graph.relations.len(),
        },
        entities: graph.entities,
        relations: graph.relations,
    };

    println!("{}", serde_json::to_string_pretty(&document)?);
    eprintln!(
        "Exported {} entities and {} relations from '{branch}'.",
        document.stats.entity_count, document.stats.relation_count
    );
    Ok(())
}
