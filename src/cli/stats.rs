use anyhow::Result;

use engram::config::MemoryConfig;
use engram::db;

/// Print store-wide row counts and the on-disk layout.
pub fn run(config: &MemoryConfig) -> Result<()> {
    let conn = db::open_database(config.db_path())?;

    let count = |table: &str| -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap_or(0)
    };

    println!("Store:        {}", config.db_path().display());
    println!("Branches:     {}", count("branches"));
    println!("Entities:     {}", count("entities"));
    println!("Observations: {}", count("observations"));
    println!("Relations:    {}", count("relations"));
    println!("Keywords:     {}", count("keywords"));
    println!("Cross-refs:   {}", count("cross_references"));

    let backups = config.backups_dir();
    let backup_count = std::fs::read_dir(&backups)
        .map(|entries| entries.count())
        .unwrap_or(0);
    println!("Backups:      {backup_count} ({})", backups.display());
    Ok(())
}
