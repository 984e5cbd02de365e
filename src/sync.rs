//! Filesystem → manifest synchronization.
//!
//! Each component directory is evaluated on its own:
//!
//! ```text
//! read manifest ──absent──▶ NoManifest
//!       │ unreadable ─────▶ ManifestUnreadable
//!       ▼
//! scan + diff ──error─────▶ Failed
//!       │ empty diff ─────▶ NoChange (or ForcedRefresh with --force)
//!       ▼
//! HasChanges ─▶ hash every file ─▶ write manifest ─▶ mirror to SQLite
//!                                                 └▶ upsert vector (opt-in)
//! ```
//!
//! A failing component never stops the batch. Dry runs compute and report
//! diffs without writing anything. Every other run ends by dropping vector
//! rows whose component no longer has a record, so removed components stop
//! showing up in search.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use mcat_core::diff::{diff_artifacts, ArtifactDiff};
use mcat_core::manifest::{ArtifactEntry, ComponentManifest};
use mcat_core::vector::UpsertRequest;
use mcat_core::FileHash;

use crate::catalog;
use crate::config::CatalogConfig;
use crate::error::IntegrityError;
use crate::hasher::hash_file;
use crate::manifest_file::{manifest_path, read_manifest, write_manifest};
use crate::scanner::{component_dirs, ArtifactScanner};
use crate::similarity::SimilarityIndex;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute and report only; write nothing.
    pub dry_run: bool,
    /// Rewrite the manifest even when nothing changed.
    pub force: bool,
    /// Upsert vector entries for components whose record was written and
    /// rebuild the ANN graph once at the end of the batch.
    pub include_vectors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No manifest in the directory; the component should be created first.
    NoManifest,
    /// The manifest exists but cannot be parsed. Left untouched.
    ManifestUnreadable,
    NoChange,
    HasChanges,
    /// No changes detected, manifest rewritten because of `force`.
    ForcedRefresh,
    /// The directory could not be scanned or an artifact could not be read
    /// while diffing.
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NoManifest => "no manifest",
            Self::ManifestUnreadable => "manifest unreadable",
            Self::NoChange => "no change",
            Self::HasChanges => "changed",
            Self::ForcedRefresh => "forced refresh",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentSyncReport {
    /// Directory name under the catalogue root.
    pub component: String,
    pub component_id: Option<String>,
    pub state: SyncState,
    pub diff: ArtifactDiff,
    /// The manifest was rewritten.
    pub applied: bool,
    pub vector_updated: bool,
    pub error: Option<String>,
    /// Stable code of `error`, when it came from an integrity failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    pub warnings: Vec<String>,
}

impl ComponentSyncReport {
    fn new(component: &str, state: SyncState) -> Self {
        Self {
            component: component.to_string(),
            component_id: None,
            state,
            diff: ArtifactDiff::default(),
            applied: false,
            vector_updated: false,
            error: None,
            error_code: None,
            warnings: Vec::new(),
        }
    }

    fn fail(&mut self, err: &IntegrityError) {
        self.error = Some(err.to_string());
        self.error_code = Some(err.code());
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub dry_run: bool,
    pub reports: Vec<ComponentSyncReport>,
    /// Component ids whose directories disappeared and whose records were
    /// removed.
    pub pruned: Vec<String>,
    pub vectors_upserted: usize,
    /// Vector rows dropped because their component has no record any more.
    pub vectors_removed: usize,
    /// Size of the ANN graph after the end-of-batch rebuild, if one ran.
    pub graph_vectors: Option<usize>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl SyncSummary {
    pub fn count(&self, state: SyncState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    pub fn errors(&self) -> usize {
        self.reports.iter().filter(|r| r.is_error()).count()
    }

    pub fn applied(&self) -> usize {
        self.reports.iter().filter(|r| r.applied).count()
    }
}

pub struct Synchronizer {
    root: PathBuf,
    manifest_name: String,
    scanner: ArtifactScanner,
    pool: SqlitePool,
    similarity: Option<Arc<SimilarityIndex>>,
}

impl Synchronizer {
    pub fn new(catalog: &CatalogConfig, pool: SqlitePool) -> Result<Self> {
        Ok(Self {
            root: catalog.root.clone(),
            manifest_name: catalog.manifest_name.clone(),
            scanner: ArtifactScanner::new(catalog)?,
            pool,
            similarity: None,
        })
    }

    /// Attach the similarity index used when `include_vectors` is set.
    pub fn with_similarity(mut self, similarity: Arc<SimilarityIndex>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Sync every component directory under the root, in name order.
    ///
    /// Outside dry runs, records of components whose directory is gone are
    /// removed from the database, then vector rows without a record.
    pub async fn sync_all(
        &self,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary> {
        let dirs = component_dirs(&self.root)?;
        let mut summary = self.run(&dirs, options, cancel).await;

        if !options.dry_run && !summary.cancelled {
            self.prune(&dirs, &mut summary).await?;
            self.purge_orphan_vectors(&mut summary).await?;
        }
        self.finish_vectors(options, &mut summary).await;
        Ok(summary)
    }

    /// Sync the single component directory `name`.
    pub async fn sync_one(
        &self,
        name: &str,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            anyhow::bail!("Component directory not found: {}", dir.display());
        }
        let mut summary = self.run(&[dir], options, cancel).await;
        if !options.dry_run && !summary.cancelled {
            self.purge_orphan_vectors(&mut summary).await?;
        }
        self.finish_vectors(options, &mut summary).await;
        Ok(summary)
    }

    async fn run(
        &self,
        dirs: &[PathBuf],
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> SyncSummary {
        let mut summary = SyncSummary {
            dry_run: options.dry_run,
            ..SyncSummary::default()
        };

        for dir in dirs {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let name = dir_name(dir);
            let (mut report, applied) = self.sync_files(dir, &name, options);

            let mirrored = match applied {
                Some(manifest) => self
                    .mirror(&name, &manifest, &mut report)
                    .await
                    .then_some(manifest),
                None if !options.dry_run && report.state == SyncState::NoChange => {
                    match self.current_manifest(dir) {
                        Some(manifest) => self
                            .mirror_if_stale(&name, &manifest, &mut report)
                            .await
                            .then_some(manifest),
                        None => None,
                    }
                }
                None => None,
            };

            if let (Some(manifest), true) = (mirrored.as_ref(), options.include_vectors) {
                self.upsert_vector(manifest, &mut report, cancel).await;
                if report.vector_updated {
                    summary.vectors_upserted += 1;
                }
            }

            log_report(&report);
            summary.reports.push(report);
        }

        summary
    }

    /// Filesystem half of a component sync. Returns the report and, when
    /// the manifest was rewritten, the new manifest.
    fn sync_files(
        &self,
        dir: &Path,
        name: &str,
        options: SyncOptions,
    ) -> (ComponentSyncReport, Option<ComponentManifest>) {
        let path = manifest_path(dir, &self.manifest_name);
        let manifest = match read_manifest(&path) {
            Ok(Some(m)) => m,
            Ok(None) => {
                let mut report = ComponentSyncReport::new(name, SyncState::NoManifest);
                report.warnings.push(format!(
                    "no {} found; create one with `mcat new {}`",
                    self.manifest_name, name
                ));
                return (report, None);
            }
            Err(e) => {
                let mut report = ComponentSyncReport::new(name, SyncState::ManifestUnreadable);
                report.fail(&e);
                return (report, None);
            }
        };

        let mut report = ComponentSyncReport::new(name, SyncState::NoChange);
        report.component_id = Some(manifest.id.clone());

        let current = match self.scanner.scan(dir) {
            Ok(paths) => paths,
            Err(e) => {
                report.state = SyncState::Failed;
                report.error = Some(format!("{:#}", e));
                return (report, None);
            }
        };

        let outcome = match diff_artifacts(&current, &manifest.artifacts, |p| {
            hash_file(&dir.join(p))
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                report.state = SyncState::Failed;
                report.fail(&e);
                return (report, None);
            }
        };

        report.state = if !outcome.diff.is_empty() {
            SyncState::HasChanges
        } else if options.force {
            SyncState::ForcedRefresh
        } else {
            SyncState::NoChange
        };
        report.diff = outcome.diff;

        if options.dry_run || report.state == SyncState::NoChange {
            return (report, None);
        }

        match apply(dir, &path, &manifest, &current, outcome.fresh) {
            Ok(updated) => {
                report.applied = true;
                (report, Some(updated))
            }
            Err(e) => {
                report.fail(&e);
                (report, None)
            }
        }
    }

    fn current_manifest(&self, dir: &Path) -> Option<ComponentManifest> {
        read_manifest(&manifest_path(dir, &self.manifest_name))
            .ok()
            .flatten()
    }

    /// Returns whether the record was written.
    async fn mirror(
        &self,
        name: &str,
        manifest: &ComponentManifest,
        report: &mut ComponentSyncReport,
    ) -> bool {
        match catalog::record_component(&self.pool, name, manifest).await {
            Ok(()) => true,
            Err(e) => {
                report
                    .warnings
                    .push(format!("database record failed: {:#}", e));
                false
            }
        }
    }

    /// Re-record an unchanged component whose stored record is missing or
    /// out of date, e.g. after its labels were edited by hand. Returns
    /// whether the record was rewritten.
    async fn mirror_if_stale(
        &self,
        name: &str,
        manifest: &ComponentManifest,
        report: &mut ComponentSyncReport,
    ) -> bool {
        match catalog::needs_record(&self.pool, name, manifest).await {
            Ok(true) => self.mirror(name, manifest, report).await,
            Ok(false) => false,
            Err(e) => {
                report
                    .warnings
                    .push(format!("database record check failed: {:#}", e));
                false
            }
        }
    }

    async fn upsert_vector(
        &self,
        manifest: &ComponentManifest,
        report: &mut ComponentSyncReport,
        cancel: &CancellationToken,
    ) {
        let Some(similarity) = self.similarity.as_ref() else {
            report
                .warnings
                .push("vector update requested but no similarity index is configured".to_string());
            return;
        };

        match similarity
            .upsert(&UpsertRequest::from(manifest), cancel)
            .await
        {
            Ok(_) => report.vector_updated = true,
            Err(e) => {
                tracing::warn!(component = %report.component, error = %e, "vector upsert failed");
                report.warnings.push(format!("vector upsert failed: {:#}", e));
            }
        }
    }

    async fn prune(&self, dirs: &[PathBuf], summary: &mut SyncSummary) -> Result<()> {
        let present: HashSet<String> = dirs.iter().map(|d| dir_name(d)).collect();
        for record in catalog::list_components(&self.pool).await? {
            if present.contains(&record.directory) {
                continue;
            }
            catalog::remove_component(&self.pool, &record.id).await?;
            tracing::info!(component = %record.directory, id = %record.id, "pruned record of removed component");
            summary.pruned.push(record.id);
        }
        Ok(())
    }

    /// Drop vector rows whose component has no record: pruned components
    /// and records replaced under a new manifest id.
    async fn purge_orphan_vectors(&self, summary: &mut SyncSummary) -> Result<()> {
        let Some(similarity) = self.similarity.as_ref() else {
            return Ok(());
        };
        for component_id in similarity.orphaned_components().await? {
            if similarity.delete_by_component(&component_id).await? {
                tracing::info!(component_id = %component_id, "removed vector of unrecorded component");
                summary.vectors_removed += 1;
            }
        }
        Ok(())
    }

    /// One ANN rebuild for the whole batch, only if vectors changed.
    async fn finish_vectors(&self, options: SyncOptions, summary: &mut SyncSummary) {
        if options.dry_run || !options.include_vectors {
            return;
        }
        if summary.vectors_upserted == 0 && summary.vectors_removed == 0 {
            return;
        }
        let Some(similarity) = self.similarity.as_ref() else {
            return;
        };
        match similarity.rebuild().await {
            Ok(n) => summary.graph_vectors = Some(n),
            Err(e) => {
                tracing::warn!(error = %e, "similarity graph rebuild failed");
                summary
                    .warnings
                    .push(format!("similarity graph rebuild failed: {:#}", e));
            }
        }
    }
}

/// Hash every current file, then write the manifest.
///
/// Nothing is written unless every file hashed successfully.
fn apply(
    dir: &Path,
    manifest_path: &Path,
    manifest: &ComponentManifest,
    current: &[String],
    mut fresh: HashMap<String, FileHash>,
) -> Result<ComponentManifest, IntegrityError> {
    let mut entries = Vec::with_capacity(current.len());
    for path in current {
        let hash = match fresh.remove(path) {
            Some(hash) => hash,
            None => hash_file(&dir.join(path))?,
        };
        entries.push(ArtifactEntry::new(path.clone(), Some(hash)));
    }

    let updated = manifest.with_artifacts(entries, chrono::Utc::now());
    updated
        .check()
        .map_err(|e| IntegrityError::ManifestInvalid {
            path: manifest_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    write_manifest(manifest_path, &updated)?;
    Ok(updated)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string())
}

fn log_report(report: &ComponentSyncReport) {
    if let Some(err) = &report.error {
        tracing::warn!(component = %report.component, state = %report.state, error = %err, "component sync failed");
    } else if report.applied {
        tracing::info!(
            component = %report.component,
            state = %report.state,
            changes = report.diff.total(),
            new = report.diff.new.len(),
            modified = report.diff.modified.len(),
            deleted = report.diff.deleted.len(),
            "manifest updated"
        );
    } else {
        tracing::debug!(component = %report.component, state = %report.state, "component checked");
    }
}
