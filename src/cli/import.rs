use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use engram::config::MemoryConfig;
use engram::memory::backup;
use engram::memory::MemoryService;

/// Import entities and relations from a JSON file (pretty export or
/// line-delimited snapshot) into a branch.
pub async fn run(config: &MemoryConfig, file: &Path, branch: Option<&str>) -> Result<()> {
    let graph = backup::read_graph(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let total = graph.entities.len();
    if total == 0 && graph.relations.is_empty() {
        println!("Nothing to import.");
        return Ok(());
    }

    let service = MemoryService::open(config.clone())?;

    println!(
        "Importing {total} entities and {} relations...",
        graph.relations.len()
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );

    // Entities one at a time so the bar tracks real progress; relations in
    // one batch at the end, matching the import contract.
    let mut created = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for record in &graph.entities {
        let input = engram::memory::types::EntityInput::from(record);
        let outcome = service.create_entities(branch, std::slice::from_ref(&input), false)?;
        created += outcome.created.len();
        errors.extend(outcome.errors);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let relations = service.create_relations(branch, &graph.relations)?;

    println!("Import complete:");
    println!("  Entities created:  {created}");
    println!("  Relations created: {}", relations.len());
    if !errors.is_empty() {
        println!("  Skipped: {}", errors.len());
        for error in &errors {
            eprintln!("    {error}");
        }
    }

    service.close().await;
    Ok(())
}
