use anyhow::Result;

use engram::config::MemoryConfig;
use engram::db;

/// Run a comprehensive database health check and print the report.
pub fn run(config: &MemoryConfig) -> Result<()> {
    let conn = db::open_database(config.db_path())?;
    let report = db::check_database_health(&conn)?;

    println!("Schema version: {}", report.schema_version);
    println!(
        "Integrity:      {}",
        if report.integrity_ok {
            "ok".to_string()
        } else {
            report.integrity_details.clone()
        }
    );
    println!("Branches:       {}", report.branch_count);
    println!("Entities:       {}", report.entity_count);
    println!("Observations:   {}", report.observation_count);
    println!("Relations:      {}", report.relation_count);

    if report.fts_count != report.entity_count {
        println!(
            "WARNING: FTS shadow out of sync ({} rows vs {} entities)",
            report.fts_count, report.entity_count
        );
    }

    if !report.integrity_ok {
        anyhow::bail!("integrity check failed — restore from a backup or run `engram reset`");
    }
    Ok(())
}
