//! Component records in SQLite and creation of new component directories.
//!
//! The `components` and `component_artifacts` tables mirror the manifests
//! on disk. The manifest stays the source of truth; these rows exist so the
//! catalogue can be listed and joined without walking the filesystem.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

use mcat_core::manifest::{ComponentCategory, ComponentManifest};

use crate::config::CatalogConfig;
use crate::manifest_file::{manifest_path, write_manifest};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentRecord {
    pub id: String,
    pub identifier: String,
    pub name: String,
    pub category: String,
    pub asset: Option<String>,
    pub project: Option<String>,
    pub directory: String,
    pub current_hash: Option<String>,
    pub artifact_count: i64,
    pub synced_at: i64,
}

/// Replace the stored record for `manifest` in one transaction.
///
/// A different component previously recorded for the same directory is
/// dropped first.
pub async fn record_component(
    pool: &SqlitePool,
    directory: &str,
    manifest: &ComponentManifest,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM components WHERE directory = ? AND id != ?")
        .bind(directory)
        .bind(&manifest.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO components
            (id, identifier, name, category, description, asset, project,
             version, directory, current_hash, synced_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            identifier = excluded.identifier,
            name = excluded.name,
            category = excluded.category,
            description = excluded.description,
            asset = excluded.asset,
            project = excluded.project,
            version = excluded.version,
            directory = excluded.directory,
            current_hash = excluded.current_hash,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&manifest.id)
    .bind(&manifest.identifier)
    .bind(&manifest.name)
    .bind(manifest.category.as_str())
    .bind(&manifest.description)
    .bind(&manifest.asset)
    .bind(&manifest.project)
    .bind(&manifest.version)
    .bind(directory)
    .bind(manifest.current_hash.as_ref().map(|h| h.as_str()))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM component_artifacts WHERE component_id = ?")
        .bind(&manifest.id)
        .execute(&mut *tx)
        .await?;

    for entry in &manifest.artifacts {
        sqlx::query("INSERT INTO component_artifacts (component_id, path, hash) VALUES (?, ?, ?)")
            .bind(&manifest.id)
            .bind(&entry.path)
            .bind(entry.hash.as_ref().map(|h| h.as_str()))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Whether the stored record for `manifest` is missing or out of date.
///
/// Label fields are compared too, so a hand-edited name or description is
/// picked up even when no artifact changed.
pub async fn needs_record(
    pool: &SqlitePool,
    directory: &str,
    manifest: &ComponentManifest,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT directory, current_hash, identifier, name, category,
               description, asset, project, version
        FROM components WHERE id = ?
        "#,
    )
    .bind(&manifest.id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(true);
    };

    let stored_hash: Option<String> = row.get("current_hash");
    let stored_description: Option<String> = row.get("description");
    let stored_asset: Option<String> = row.get("asset");
    let stored_project: Option<String> = row.get("project");

    Ok(row.get::<String, _>("directory") != directory
        || stored_hash.as_deref() != manifest.current_hash.as_ref().map(|h| h.as_str())
        || row.get::<String, _>("identifier") != manifest.identifier
        || row.get::<String, _>("name") != manifest.name
        || row.get::<String, _>("category") != manifest.category.as_str()
        || row.get::<String, _>("version") != manifest.version
        || stored_description != manifest.description
        || stored_asset != manifest.asset
        || stored_project != manifest.project)
}

pub async fn remove_component(pool: &SqlitePool, id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM component_artifacts WHERE component_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM components WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn list_components(pool: &SqlitePool) -> Result<Vec<ComponentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.identifier, c.name, c.category, c.asset, c.project,
               c.directory, c.current_hash, c.synced_at,
               (SELECT COUNT(*) FROM component_artifacts a WHERE a.component_id = c.id)
                   AS artifact_count
        FROM components c
        ORDER BY c.directory
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ComponentRecord {
            id: row.get("id"),
            identifier: row.get("identifier"),
            name: row.get("name"),
            category: row.get("category"),
            asset: row.get("asset"),
            project: row.get("project"),
            directory: row.get("directory"),
            current_hash: row.get("current_hash"),
            artifact_count: row.get("artifact_count"),
            synced_at: row.get("synced_at"),
        })
        .collect())
}

/// Fields for a brand-new component.
#[derive(Debug, Clone, Default)]
pub struct NewComponent {
    pub directory: String,
    pub identifier: String,
    pub category: ComponentCategory,
    pub name: Option<String>,
    pub description: Option<String>,
    pub asset: Option<String>,
    pub project: Option<String>,
}

/// Create `<root>/<directory>/` with a fresh manifest.
///
/// The manifest gets a v4 UUID and no artifacts; the next sync registers
/// whatever files have been dropped into the directory.
pub fn create_component(
    catalog: &CatalogConfig,
    new: &NewComponent,
) -> Result<(PathBuf, ComponentManifest)> {
    let dir_name = new.directory.trim();
    if dir_name.is_empty()
        || dir_name.starts_with('.')
        || dir_name.contains('/')
        || dir_name.contains('\\')
    {
        bail!("Invalid component directory name: '{}'", new.directory);
    }

    let dir = catalog.root.join(dir_name);
    let path = manifest_path(&dir, &catalog.manifest_name);
    if path.exists() {
        bail!("Component already has a manifest: {}", path.display());
    }
    std::fs::create_dir_all(&dir)?;

    let mut manifest = ComponentManifest::new(
        Uuid::new_v4().to_string(),
        new.identifier.trim(),
        new.category,
    );
    manifest.name = new.name.clone().unwrap_or_default();
    manifest.description = new.description.clone();
    manifest.asset = new.asset.clone();
    manifest.project = new.project.clone();
    manifest.updated_at = Some(chrono::Utc::now());
    manifest.check()?;

    write_manifest(&path, &manifest)?;
    Ok((dir, manifest))
}
