//! Per-component manifest model.
//!
//! A manifest is the persisted, declared state of one component: its
//! identity, descriptive labels, and the list of artifact files with their
//! content hashes. Manifests are plain values; producing an updated manifest
//! returns a new value rather than mutating in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::hash::{combine_hashes, FileHash};

/// How a component is sourced. Drives integrity severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    /// Made in-house from drawings.
    #[default]
    Fabricated,
    /// Bought from a vendor.
    Purchased,
    /// Catalogue/standard hardware (bolts, bearings, ...).
    Standard,
}

impl ComponentCategory {
    /// Purchased and standard parts are off-the-shelf.
    pub fn is_off_the_shelf(self) -> bool {
        matches!(self, Self::Purchased | Self::Standard)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fabricated => "fabricated",
            Self::Purchased => "purchased",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentCategory {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fabricated" => Ok(Self::Fabricated),
            "purchased" => Ok(Self::Purchased),
            "standard" => Ok(Self::Standard),
            other => Err(ManifestError::UnknownCategory(other.to_string())),
        }
    }
}

/// Structural problems in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("manifest field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("artifact path '{0}' is listed more than once")]
    DuplicatePath(String),
    #[error("artifact path '{0}' must be relative and must not leave the component directory")]
    InvalidPath(String),
    #[error("unknown component category '{0}'. Must be fabricated, purchased, or standard")]
    UnknownCategory(String),
}

/// One declared artifact file: relative path plus its recorded hash.
///
/// A missing or empty hash means the file was registered but never hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    #[serde(
        default,
        deserialize_with = "empty_hash_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub hash: Option<FileHash>,
}

impl ArtifactEntry {
    pub fn new(path: impl Into<String>, hash: Option<FileHash>) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }
}

/// The persisted manifest of a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifest {
    /// Stable component id (UUID for manifests created by the CLI).
    pub id: String,
    /// Human-facing part number, e.g. `"BP-1042"`.
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: ComponentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(
        default,
        deserialize_with = "empty_hash_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_hash: Option<FileHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> String {
    "1".to_string()
}

fn empty_hash_as_none<'de, D>(deserializer: D) -> Result<Option<FileHash>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.trim().is_empty() => FileHash::parse(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Case-insensitive comparison key for artifact paths.
pub fn path_key(path: &str) -> String {
    path.to_lowercase()
}

/// Sort artifact entries by path, case-insensitively, ties broken by the
/// exact spelling so the order is total.
pub fn sort_artifacts(entries: &mut [ArtifactEntry]) {
    entries.sort_by(|a, b| {
        path_key(&a.path)
            .cmp(&path_key(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Combined hash of a sorted artifact list.
///
/// Returns `None` when any entry lacks a hash; a partial set has no
/// meaningful combined value.
pub fn combined_hash(entries: &[ArtifactEntry]) -> Option<FileHash> {
    let hashes: Option<Vec<&FileHash>> = entries.iter().map(|e| e.hash.as_ref()).collect();
    hashes.map(combine_hashes)
}

impl ComponentManifest {
    /// A fresh manifest with no artifacts.
    pub fn new(
        id: impl Into<String>,
        identifier: impl Into<String>,
        category: ComponentCategory,
    ) -> Self {
        Self {
            id: id.into(),
            identifier: identifier.into(),
            name: String::new(),
            category,
            description: None,
            asset: None,
            project: None,
            version: default_version(),
            artifacts: Vec::new(),
            current_hash: None,
            updated_at: None,
        }
    }

    /// Check identity fields and artifact path uniqueness.
    pub fn check(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::EmptyField("id"));
        }
        if self.identifier.trim().is_empty() {
            return Err(ManifestError::EmptyField("identifier"));
        }

        let mut seen = HashSet::new();
        for entry in &self.artifacts {
            let path = entry.path.trim();
            if path.is_empty() {
                return Err(ManifestError::EmptyField("artifacts[].path"));
            }
            if path.starts_with('/')
                || path.contains('\\')
                || path.split('/').any(|seg| seg == ".." || seg.is_empty())
            {
                return Err(ManifestError::InvalidPath(entry.path.clone()));
            }
            if !seen.insert(path_key(path)) {
                return Err(ManifestError::DuplicatePath(entry.path.clone()));
            }
        }
        Ok(())
    }

    /// Look up the recorded entry for a path, case-insensitively.
    pub fn artifact(&self, path: &str) -> Option<&ArtifactEntry> {
        let key = path_key(path);
        self.artifacts.iter().find(|e| path_key(&e.path) == key)
    }

    /// Produce a manifest whose artifact list is replaced wholesale.
    ///
    /// Entries are sorted by path before the combined hash is computed, so
    /// the same artifact set always yields the same `current_hash`.
    pub fn with_artifacts(&self, mut artifacts: Vec<ArtifactEntry>, now: DateTime<Utc>) -> Self {
        sort_artifacts(&mut artifacts);
        let current_hash = combined_hash(&artifacts);
        Self {
            artifacts,
            current_hash,
            updated_at: Some(now),
            ..self.clone()
        }
    }

    /// Text describing the component for similarity search.
    pub fn summary_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.name.trim().is_empty() {
            parts.push(self.name.trim());
        }
        if let Some(desc) = self.description.as_deref().map(str::trim) {
            if !desc.is_empty() {
                parts.push(desc);
            }
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_text;

    fn manifest_json(artifacts: &str) -> String {
        format!(
            r#"{{"id":"c-1","identifier":"BP-1","category":"purchased","artifacts":{}}}"#,
            artifacts
        )
    }

    #[test]
    fn empty_hash_string_reads_as_unhashed() {
        let json = manifest_json(r#"[{"path":"a.dxf","hash":""},{"path":"b.dxf"}]"#);
        let m: ComponentManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m.artifacts.len(), 2);
        assert!(m.artifacts.iter().all(|a| a.hash.is_none()));
        assert_eq!(m.category, ComponentCategory::Purchased);
        assert_eq!(m.version, "1");
    }

    #[test]
    fn malformed_hash_fails_to_parse() {
        let json = manifest_json(r#"[{"path":"a.dxf","hash":"md5:1234"}]"#);
        assert!(serde_json::from_str::<ComponentManifest>(&json).is_err());
    }

    #[test]
    fn check_rejects_case_insensitive_duplicates() {
        let mut m = ComponentManifest::new("c-1", "BP-1", ComponentCategory::Fabricated);
        m.artifacts = vec![
            ArtifactEntry::new("Plate.DXF", None),
            ArtifactEntry::new("plate.dxf", None),
        ];
        assert_eq!(
            m.check(),
            Err(ManifestError::DuplicatePath("plate.dxf".into()))
        );
    }

    #[test]
    fn check_rejects_escaping_paths() {
        let mut m = ComponentManifest::new("c-1", "BP-1", ComponentCategory::Fabricated);
        m.artifacts = vec![ArtifactEntry::new("../other/a.dxf", None)];
        assert!(matches!(m.check(), Err(ManifestError::InvalidPath(_))));
        m.artifacts = vec![ArtifactEntry::new("/abs.dxf", None)];
        assert!(matches!(m.check(), Err(ManifestError::InvalidPath(_))));
    }

    #[test]
    fn check_requires_identity() {
        let m = ComponentManifest::new(" ", "BP-1", ComponentCategory::Fabricated);
        assert_eq!(m.check(), Err(ManifestError::EmptyField("id")));
    }

    #[test]
    fn with_artifacts_sorts_and_combines() {
        let m = ComponentManifest::new("c-1", "BP-1", ComponentCategory::Fabricated);
        let a = ArtifactEntry::new("a.dxf", Some(hash_text("a")));
        let b = ArtifactEntry::new("B.step", Some(hash_text("b")));
        let now = Utc::now();

        let forward = m.with_artifacts(vec![a.clone(), b.clone()], now);
        let reverse = m.with_artifacts(vec![b, a], now);

        assert_eq!(forward.artifacts, reverse.artifacts);
        assert_eq!(forward.artifacts[0].path, "a.dxf");
        assert_eq!(forward.current_hash, reverse.current_hash);
        assert!(forward.current_hash.is_some());
        assert_eq!(forward.updated_at, Some(now));
        // the source value is untouched
        assert!(m.artifacts.is_empty());
    }

    #[test]
    fn combined_hash_requires_every_entry_hashed() {
        let entries = vec![
            ArtifactEntry::new("a.dxf", Some(hash_text("a"))),
            ArtifactEntry::new("b.dxf", None),
        ];
        assert!(combined_hash(&entries).is_none());
        assert!(combined_hash(&[]).is_some());
    }

    #[test]
    fn artifact_lookup_ignores_case() {
        let mut m = ComponentManifest::new("c-1", "BP-1", ComponentCategory::Standard);
        m.artifacts = vec![ArtifactEntry::new("Docs/Spec.PDF", None)];
        assert!(m.artifact("docs/spec.pdf").is_some());
        assert!(m.artifact("docs/other.pdf").is_none());
    }

    #[test]
    fn category_parsing() {
        assert_eq!(
            "Purchased".parse::<ComponentCategory>().unwrap(),
            ComponentCategory::Purchased
        );
        assert!("bought".parse::<ComponentCategory>().is_err());
        assert!(ComponentCategory::Standard.is_off_the_shelf());
        assert!(!ComponentCategory::Fabricated.is_off_the_shelf());
    }

    #[test]
    fn summary_text_skips_empty_parts() {
        let mut m = ComponentManifest::new("c-1", "BP-1", ComponentCategory::Fabricated);
        assert_eq!(m.summary_text(), "");
        m.name = "Base plate".into();
        m.description = Some("  ".into());
        assert_eq!(m.summary_text(), "Base plate");
        m.description = Some("steel, 10 mm".into());
        assert_eq!(m.summary_text(), "Base plate steel, 10 mm");
    }
}
