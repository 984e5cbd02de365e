//! Artifact diffing between the filesystem and a manifest.
//!
//! ```text
//! current    = files on disk (minus housekeeping)
//! registered = paths in the manifest
//!
//! new      = current − registered
//! deleted  = registered − current
//! modified = { p ∈ current ∩ registered : recorded(p) present ∧ fresh(p) ≠ recorded(p) }
//! ```
//!
//! Paths are matched case-insensitively. Hashing is supplied by the caller
//! as a closure so this module stays free of I/O; every hash the closure
//! produces is returned in [`DiffOutcome::fresh`] for reuse.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::hash::FileHash;
use crate::manifest::{path_key, ArtifactEntry};

/// Paths classified by change kind, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactDiff {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ArtifactDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }
}

/// Result of [`diff_artifacts`].
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub diff: ArtifactDiff,
    /// Hashes computed while diffing, keyed by on-disk path spelling.
    pub fresh: HashMap<String, FileHash>,
}

/// Diff the on-disk artifact list against the manifest's entries.
///
/// `current` holds relative paths as found on disk. `fresh_hash` is only
/// invoked for paths present on both sides whose manifest entry carries a
/// recorded hash; the first error it returns aborts the diff.
pub fn diff_artifacts<E, F>(
    current: &[String],
    registered: &[ArtifactEntry],
    mut fresh_hash: F,
) -> Result<DiffOutcome, E>
where
    F: FnMut(&str) -> Result<FileHash, E>,
{
    let on_disk: BTreeMap<String, &str> = current
        .iter()
        .map(|p| (path_key(p), p.as_str()))
        .collect();
    let declared: BTreeMap<String, &ArtifactEntry> =
        registered.iter().map(|e| (path_key(&e.path), e)).collect();

    let mut outcome = DiffOutcome::default();

    for (key, disk_path) in &on_disk {
        match declared.get(key) {
            None => outcome.diff.new.push(disk_path.to_string()),
            Some(entry) => {
                let Some(recorded) = entry.hash.as_ref() else {
                    continue;
                };
                let fresh = fresh_hash(disk_path)?;
                if &fresh != recorded {
                    outcome.diff.modified.push(entry.path.clone());
                }
                outcome.fresh.insert(disk_path.to_string(), fresh);
            }
        }
    }

    for (key, entry) in &declared {
        if !on_disk.contains_key(key) {
            outcome.diff.deleted.push(entry.path.clone());
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_text;
    use std::convert::Infallible;

    fn disk(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    /// Pretend file contents equal their path.
    fn content_hash(path: &str) -> Result<FileHash, Infallible> {
        Ok(hash_text(path))
    }

    #[test]
    fn new_file_detected() {
        let registered = vec![ArtifactEntry::new("a.dxf", Some(hash_text("a.dxf")))];
        let out = diff_artifacts(&disk(&["a.dxf", "b.dxf"]), &registered, content_hash).unwrap();
        assert_eq!(out.diff.new, vec!["b.dxf"]);
        assert!(out.diff.modified.is_empty());
        assert!(out.diff.deleted.is_empty());
    }

    #[test]
    fn altered_recorded_hash_is_modified() {
        let registered = vec![ArtifactEntry::new("a.dxf", Some(hash_text("something else")))];
        let out = diff_artifacts(&disk(&["a.dxf", "b.dxf"]), &registered, content_hash).unwrap();
        assert_eq!(out.diff.new, vec!["b.dxf"]);
        assert_eq!(out.diff.modified, vec!["a.dxf"]);
        assert_eq!(out.fresh.get("a.dxf"), Some(&hash_text("a.dxf")));
    }

    #[test]
    fn missing_file_is_deleted() {
        let registered = vec![
            ArtifactEntry::new("a.dxf", Some(hash_text("a.dxf"))),
            ArtifactEntry::new("gone.pdf", None),
        ];
        let out = diff_artifacts(&disk(&["a.dxf"]), &registered, content_hash).unwrap();
        assert_eq!(out.diff.deleted, vec!["gone.pdf"]);
        assert_eq!(out.diff.total(), 1);
    }

    #[test]
    fn unhashed_entries_are_never_modified_or_hashed() {
        let registered = vec![ArtifactEntry::new("a.dxf", None)];
        let mut calls = 0;
        let out = diff_artifacts(&disk(&["a.dxf"]), &registered, |p| {
            calls += 1;
            content_hash(p)
        })
        .unwrap();
        assert!(out.diff.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn path_matching_ignores_case() {
        let registered = vec![ArtifactEntry::new("Drawings/A.DXF", Some(hash_text("drawings/a.dxf")))];
        let out = diff_artifacts(&disk(&["drawings/a.dxf"]), &registered, content_hash).unwrap();
        assert!(out.diff.is_empty());
    }

    #[test]
    fn hashing_error_aborts() {
        let registered = vec![ArtifactEntry::new("a.dxf", Some(hash_text("a.dxf")))];
        let result: Result<DiffOutcome, String> =
            diff_artifacts(&disk(&["a.dxf"]), &registered, |_| Err("locked".to_string()));
        assert_eq!(result.unwrap_err(), "locked");
    }

    #[test]
    fn lists_are_sorted() {
        let out =
            diff_artifacts(&disk(&["c.dxf", "A.dxf", "b.dxf"]), &[], content_hash).unwrap();
        assert_eq!(out.diff.new, vec!["A.dxf", "b.dxf", "c.dxf"]);
    }
}
