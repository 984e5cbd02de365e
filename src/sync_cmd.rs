//! `mcat sync`: bring manifests in line with the files on disk.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::similarity::SimilarityIndex;
use crate::sync::{ComponentSyncReport, SyncOptions, SyncState, SyncSummary, Synchronizer};

/// Run a sync over one component or the whole catalogue and print the
/// report. Returns the summary so the caller can pick an exit code.
pub async fn run_sync(
    config: &Config,
    component: Option<&str>,
    options: SyncOptions,
    json: bool,
    cancel: &CancellationToken,
) -> Result<SyncSummary> {
    let pool = db::connect(config).await?;
    // Without --include-vectors the index is still needed to drop vectors
    // of removed components.
    let similarity = if options.include_vectors {
        SimilarityIndex::from_config(config, pool.clone())?
    } else {
        SimilarityIndex::for_maintenance(config, pool.clone())
    };
    let synchronizer =
        Synchronizer::new(&config.catalog, pool.clone())?.with_similarity(Arc::new(similarity));

    let summary = match component {
        Some(name) => synchronizer.sync_one(name, options, cancel).await?,
        None => synchronizer.sync_all(options, cancel).await?,
    };
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(summary)
}

fn print_summary(summary: &SyncSummary) {
    if summary.dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }

    for report in &summary.reports {
        print_report(report, summary.dry_run);
    }

    println!();
    println!("  components: {}", summary.reports.len());
    println!("  changed: {}", summary.count(SyncState::HasChanges));
    println!("  unchanged: {}", summary.count(SyncState::NoChange));
    if summary.count(SyncState::ForcedRefresh) > 0 {
        println!("  forced: {}", summary.count(SyncState::ForcedRefresh));
    }
    if summary.count(SyncState::NoManifest) > 0 {
        println!("  without manifest: {}", summary.count(SyncState::NoManifest));
    }
    if !summary.dry_run {
        println!("  manifests written: {}", summary.applied());
    }
    if !summary.pruned.is_empty() {
        println!("  records pruned: {}", summary.pruned.len());
    }
    if summary.vectors_upserted > 0 || summary.vectors_removed > 0 {
        println!("  vectors upserted: {}", summary.vectors_upserted);
        println!("  vectors removed: {}", summary.vectors_removed);
    }
    if let Some(n) = summary.graph_vectors {
        println!("  graph vectors: {}", n);
    }
    for warning in &summary.warnings {
        eprintln!("Warning: {}", warning);
    }
    if summary.cancelled {
        println!("  cancelled before all components were processed");
    }

    let errors = summary.errors();
    if errors > 0 {
        println!("  errors: {}", errors);
    } else {
        println!("ok");
    }
}

fn print_report(report: &ComponentSyncReport, dry_run: bool) {
    let marker = if dry_run && report.state == SyncState::HasChanges {
        " (would update)"
    } else {
        ""
    };
    println!("  {}: {}{}", report.component, report.state, marker);

    for path in &report.diff.new {
        println!("    + {}", path);
    }
    for path in &report.diff.modified {
        println!("    ~ {}", path);
    }
    for path in &report.diff.deleted {
        println!("    - {}", path);
    }
    if report.vector_updated {
        println!("    vector updated");
    }
    for warning in &report.warnings {
        println!("    warning: {}", warning);
    }
    if let Some(err) = &report.error {
        println!("    error: {}", err);
    }
}
