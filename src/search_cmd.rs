//! `mcat search` and `mcat index`: similarity queries and index upkeep.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::similarity::SimilarityIndex;

/// Search the catalogue for components similar to `query`.
///
/// `limit` and `threshold` fall back to the `[index]` defaults.
pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let limit = limit.unwrap_or(config.index.default_limit);
    let threshold = threshold.unwrap_or(config.index.default_threshold);

    let pool = db::connect(config).await?;
    let index = SimilarityIndex::from_config(config, pool.clone())?;
    let hits = index.search(query, threshold, limit, cancel).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let entry = &hit.entry;
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            entry.identifier,
            entry.category.as_deref().unwrap_or("-")
        );
        println!("    component: {}", entry.component_id);
        if let Some(asset) = &entry.asset {
            println!("    asset: {}", asset);
        }
        if let Some(project) = &entry.project {
            println!("    project: {}", project);
        }
        println!("    text: \"{}\"", entry.content);
        println!();
    }
    Ok(())
}

/// Rebuild the ANN graph from the stored vectors.
pub async fn run_index_rebuild(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let index = SimilarityIndex::from_config(config, pool.clone())?;
    let count = index.rebuild().await?;
    pool.close().await;

    println!("index rebuild");
    println!("  graph vectors: {}", count);
    println!("  cache: {}", config.index.cache_path.display());
    println!("ok");
    Ok(())
}

/// Delete every vector row and the cached graph. Works without an
/// embedding provider.
pub async fn run_index_clear(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let index = SimilarityIndex::for_maintenance(config, pool.clone());
    let removed = index.clear().await?;
    pool.close().await;

    println!("index clear");
    println!("  rows removed: {}", removed);
    println!("ok");
    Ok(())
}

pub async fn run_index_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let index = SimilarityIndex::for_maintenance(config, pool.clone());
    let stats = index.stats().await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("index stats");
    println!("  provider: {}", stats.provider);
    println!("  dims: {}", stats.dims);
    println!("  rows: {}", stats.rows);
    println!("  usable rows: {}", stats.usable);
    if stats.rows as usize > stats.usable {
        println!(
            "  skipped rows: {} (different dimension; run `mcat sync --include-vectors --force` to re-embed)",
            stats.rows as usize - stats.usable
        );
    }
    println!(
        "  cache: {}",
        if stats.cache_present { "present" } else { "absent" }
    );
    Ok(())
}
