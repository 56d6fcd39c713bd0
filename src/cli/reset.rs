use anyhow::Result;

use engram::config::MemoryConfig;

/// Delete the `.memory/` directory (database, WAL sidecars, and backups).
/// Refuses to run without `--yes`.
pub fn run(config: &MemoryConfig, yes: bool) -> Result<()> {
    let memory_dir = config.memory_dir();

    if !yes {
        anyhow::bail!(
            "this deletes {} including all backups; re-run with --yes to confirm",
            memory_dir.display()
        );
    }

    if memory_dir.exists() {
        std::fs::remove_dir_all(&memory_dir)?;
        println!("Removed {}", memory_dir.display());
    } else {
        println!("Nothing to remove at {}", memory_dir.display());
    }
    Ok(())
}
