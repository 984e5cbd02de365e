//! `mcat components`, `mcat new`, and `mcat validate`.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;

use mcat_core::integrity::{Severity, ValidationResult};

use crate::catalog::{create_component, list_components, NewComponent};
use crate::config::Config;
use crate::db;
use crate::integrity;
use crate::manifest_file::{manifest_path, read_manifest};
use crate::scanner::component_dirs;

pub async fn run_components(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let records = list_components(&pool).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No components recorded. Run `mcat sync` first.");
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:<11} {:>9}  SYNCED",
        "DIRECTORY", "IDENTIFIER", "CATEGORY", "ARTIFACTS"
    );
    for r in &records {
        let synced = chrono::DateTime::from_timestamp(r.synced_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<16} {:<11} {:>9}  {}",
            r.directory, r.identifier, r.category, r.artifact_count, synced
        );
    }
    println!();
    println!("{} component(s)", records.len());
    Ok(())
}

pub fn run_new(config: &Config, new: &NewComponent) -> Result<()> {
    let (dir, manifest) = create_component(&config.catalog, new)?;
    println!("Created component {}", manifest.identifier);
    println!("  id: {}", manifest.id);
    println!("  category: {}", manifest.category.as_str());
    println!(
        "  manifest: {}",
        manifest_path(&dir, &config.catalog.manifest_name).display()
    );
    println!("Add files to {} and run `mcat sync`.", dir.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct ComponentValidation {
    component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentValidation {
    fn severity(&self) -> Severity {
        match (&self.result, &self.error) {
            (_, Some(_)) => Severity::Error,
            (Some(result), None) => result.severity,
            (None, None) => Severity::Ok,
        }
    }
}

/// Verify artifacts against their recorded hashes.
///
/// Returns `false` when any component has an error-level finding.
pub fn run_validate(config: &Config, component: Option<&str>, json: bool) -> Result<bool> {
    let dirs = match component {
        Some(name) => {
            let dir = config.catalog.root.join(name);
            if !dir.is_dir() {
                bail!("Component directory not found: {}", dir.display());
            }
            vec![dir]
        }
        None => component_dirs(&config.catalog.root)?,
    };

    let mut results = Vec::with_capacity(dirs.len());
    for dir in &dirs {
        if let Some(v) = validate_dir(dir, &config.catalog.manifest_name) {
            results.push(v);
        }
    }

    let worst = results
        .iter()
        .map(ComponentValidation::severity)
        .max()
        .unwrap_or(Severity::Ok);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(worst != Severity::Error);
    }

    println!("validate");
    for v in &results {
        match (&v.result, &v.error) {
            (_, Some(err)) => println!("  {}: error ({})", v.component, err),
            (Some(result), None) => {
                println!(
                    "  {}: {} ({} artifact(s) checked)",
                    v.component, result.severity, result.checked
                );
                for issue in &result.issues {
                    println!("    {}", issue);
                }
            }
            (None, None) => {}
        }
    }
    println!();
    println!("  components: {}", results.len());
    println!("  result: {}", worst);
    Ok(worst != Severity::Error)
}

/// `None` for directories without a manifest; there is nothing to check.
fn validate_dir(dir: &Path, manifest_name: &str) -> Option<ComponentValidation> {
    let component = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match read_manifest(&manifest_path(dir, manifest_name)) {
        Ok(None) => None,
        Ok(Some(manifest)) => Some(ComponentValidation {
            component,
            result: Some(integrity::validate(dir, &manifest)),
            error: None,
        }),
        Err(e) => Some(ComponentValidation {
            component,
            result: None,
            error: Some(e.to_string()),
        }),
    }
}
