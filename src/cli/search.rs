use anyhow::Result;

use engram::config::MemoryConfig;
use engram::memory::types::EntityStatus;
use engram::memory::MemoryService;

/// Run a search through the full service path (expansion included) and
/// print a compact listing.
pub async fn run(
    config: &MemoryConfig,
    query: &str,
    branch: Option<&str>,
    statuses: &[String],
    depth: Option<u8>,
) -> Result<()> {
    let parsed: Vec<EntityStatus> = statuses
        .iter()
        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    let status_filter = if parsed.is_empty() {
        None
    } else {
        Some(parsed.as_slice())
    };

    let service = MemoryService::open(config.clone())?;
    let result = service.search(query, branch, status_filter, depth)?;

    if result.entities.is_empty() {
        println!("No matches.");
    } else {
        for hit in &result.entities {
            println!(
                "{:>7.1}  {} [{}] ({})",
                hit.relevance_score, hit.entity.name, hit.entity.entity_type, hit.entity.status
            );
            for obs in hit.entity.observations.iter().take(2) {
                println!("         - {}", obs.content);
            }
        }
        if !result.relations.is_empty() {
            println!();
            for rel in &result.relations {
                println!("  {} --{}--> {}", rel.from, rel.relation_type, rel.to);
            }
        }
    }

    service.close().await;
    Ok(())
}
