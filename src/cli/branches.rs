use anyhow::Result;

use engram::config::MemoryConfig;
use engram::db;
use engram::memory::store;

/// List branches with entity and relation counts, `main` first.
pub fn run(config: &MemoryConfig) -> Result<()> {
    let conn = db::open_database(config.db_path())?;
    let branches = store::list_branches(&conn)?;

    println!("{:<24} {:>8} {:>10}  purpose", "branch", "entities", "relations");
    for info in branches {
        println!(
            "{:<24} {:>8} {:>10}  {}",
            info.name, info.entity_count, info.relation_count, info.purpose
        );
    }
    Ok(())
}
