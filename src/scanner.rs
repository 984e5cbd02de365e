//! Component directory walking.
//!
//! Lists the artifact files of a component directory as relative,
//! `/`-separated paths. The manifest itself, its in-flight temp file,
//! configured housekeeping names, and anything matching the exclude globs
//! are never artifacts.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use mcat_core::manifest::path_key;

use crate::config::CatalogConfig;

pub struct ArtifactScanner {
    ignored_names: HashSet<String>,
    exclude_set: GlobSet,
    follow_symlinks: bool,
}

/// Name of the temp file a manifest is staged in before the rename.
pub fn manifest_temp_name(manifest_name: &str) -> String {
    format!(".{}.tmp", manifest_name)
}

impl ArtifactScanner {
    pub fn new(catalog: &CatalogConfig) -> Result<Self> {
        let mut ignored_names: HashSet<String> = catalog
            .housekeeping
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        ignored_names.insert(catalog.manifest_name.to_lowercase());
        ignored_names.insert(manifest_temp_name(&catalog.manifest_name).to_lowercase());

        let mut excludes = vec!["**/.git/**".to_string()];
        excludes.extend(catalog.exclude_globs.clone());

        Ok(Self {
            ignored_names,
            exclude_set: build_globset(&excludes)?,
            follow_symlinks: catalog.follow_symlinks,
        })
    }

    fn is_ignored(&self, relative: &str) -> bool {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        self.ignored_names.contains(&file_name.to_lowercase())
            || self.exclude_set.is_match(relative)
    }

    /// Relative artifact paths under `dir`, sorted.
    ///
    /// Fails if two paths differ only by letter case; a manifest cannot
    /// hold both.
    pub fn scan(&self, dir: &Path) -> Result<Vec<String>> {
        if !dir.is_dir() {
            bail!("Component directory does not exist: {}", dir.display());
        }

        let mut paths = Vec::new();
        let walker = WalkDir::new(dir).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.is_ignored(&rel_str) {
                continue;
            }
            paths.push(rel_str);
        }

        paths.sort();
        check_case_collisions(&paths)?;
        Ok(paths)
    }
}

fn check_case_collisions(paths: &[String]) -> Result<()> {
    let mut by_key: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for path in paths {
        by_key.entry(path_key(path)).or_default().push(path);
    }

    let collisions: Vec<String> = by_key
        .values()
        .filter(|spellings| spellings.len() > 1)
        .map(|spellings| spellings.join(", "))
        .collect();
    if !collisions.is_empty() {
        bail!(
            "Artifact paths differ only by case: {}",
            collisions.join("; ")
        );
    }
    Ok(())
}

/// Immediate sub-directories of the catalogue root, sorted by name.
/// Hidden directories are skipped.
pub fn component_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Catalogue root does not exist: {}", root.display());
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog(root: &Path) -> CatalogConfig {
        CatalogConfig {
            root: root.to_path_buf(),
            manifest_name: "component.json".to_string(),
            housekeeping: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            exclude_globs: vec!["**/*.bak".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn scan_skips_manifest_and_housekeeping() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("drawings")).unwrap();
        std::fs::write(dir.join("component.json"), "{}").unwrap();
        std::fs::write(dir.join(".component.json.tmp"), "{}").unwrap();
        std::fs::write(dir.join("thumbs.DB"), "x").unwrap();
        std::fs::write(dir.join(".DS_Store"), "x").unwrap();
        std::fs::write(dir.join("old.bak"), "x").unwrap();
        std::fs::write(dir.join("b.step"), "solid").unwrap();
        std::fs::write(dir.join("drawings").join("a.dxf"), "lines").unwrap();

        let scanner = ArtifactScanner::new(&catalog(dir)).unwrap();
        let paths = scanner.scan(dir).unwrap();
        assert_eq!(paths, vec!["b.step", "drawings/a.dxf"]);
    }

    #[test]
    fn scan_rejects_paths_differing_only_by_case() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("A.dxf"), "upper").unwrap();
        std::fs::write(dir.join("a.dxf"), "lower").unwrap();
        std::fs::write(dir.join("b.step"), "solid").unwrap();

        let scanner = ArtifactScanner::new(&catalog(dir)).unwrap();
        let err = scanner.scan(dir).unwrap_err().to_string();
        assert!(err.contains("A.dxf, a.dxf"), "{}", err);
    }

    #[test]
    fn scan_of_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let scanner = ArtifactScanner::new(&catalog(tmp.path())).unwrap();
        assert!(scanner.scan(&tmp.path().join("gone")).is_err());
    }

    #[test]
    fn component_dirs_sorted_and_visible_only() {
        let tmp = TempDir::new().unwrap();
        for name in ["P2", "P1", ".trash"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        std::fs::write(tmp.path().join("README.txt"), "x").unwrap();

        let dirs = component_dirs(tmp.path()).unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["P1", "P2"]);
    }
}
