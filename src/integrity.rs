//! Integrity verification of a component directory against its manifest.
//!
//! Read-only: nothing on disk or in the manifest is touched.

use std::path::Path;

use mcat_core::integrity::{ValidationIssue, ValidationResult};
use mcat_core::manifest::ComponentManifest;

use crate::error::IntegrityError;
use crate::hasher::hash_file;

/// Check every declared artifact of `manifest` under `dir`.
///
/// Entries without a recorded hash are only checked for presence.
pub fn validate(dir: &Path, manifest: &ComponentManifest) -> ValidationResult {
    let mut issues = Vec::new();

    for entry in &manifest.artifacts {
        let path = dir.join(&entry.path);
        if !path.exists() {
            issues.push(ValidationIssue::missing(manifest.category, &entry.path));
            continue;
        }

        let Some(expected) = entry.hash.as_ref() else {
            continue;
        };

        match hash_file(&path) {
            Ok(actual) if &actual == expected => {}
            Ok(actual) => issues.push(ValidationIssue::mismatch(
                manifest.category,
                &entry.path,
                expected.clone(),
                actual,
            )),
            Err(IntegrityError::FileNotFound { .. }) => {
                issues.push(ValidationIssue::missing(manifest.category, &entry.path))
            }
            Err(e) => issues.push(ValidationIssue::unreadable(&entry.path, e.to_string())),
        }
    }

    ValidationResult::from_issues(manifest.artifacts.len(), issues)
}
