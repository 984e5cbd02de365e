//! Severity model for artifact integrity checks.
//!
//! The filesystem checks live in the app crate; this module decides how
//! serious each finding is and aggregates findings into one result.
//!
//! | Finding | fabricated | purchased / standard |
//! |---------|------------|----------------------|
//! | missing drawing or model | Error | Error |
//! | missing document or other file | Error | Warning |
//! | hash mismatch | Error | Warning |
//! | unreadable file | Error | Error |

use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::hash::FileHash;
use crate::manifest::ComponentCategory;

/// Ordered severity; aggregation takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Broad artifact classes, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// 2D fabrication drawings.
    Drawing,
    /// 3D models and exchange formats.
    Model,
    /// Specifications, datasheets, notes.
    Document,
    Other,
}

impl ArtifactKind {
    pub fn classify(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "dxf" | "dwg" | "idw" | "slddrw" | "drw" => Self::Drawing,
            "step" | "stp" | "iges" | "igs" | "sldprt" | "sldasm" | "ipt" | "iam" | "stl"
            | "x_t" | "3mf" | "f3d" => Self::Model,
            "pdf" | "doc" | "docx" | "txt" | "md" | "xls" | "xlsx" | "csv" | "odt" | "rtf" => {
                Self::Document
            }
            _ => Self::Other,
        }
    }
}

/// What went wrong with one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    HashMismatch {
        expected: FileHash,
        actual: FileHash,
    },
    Unreadable {
        reason: String,
    },
}

/// A single graded finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub kind: IssueKind,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn missing(category: ComponentCategory, path: &str) -> Self {
        let severity = match ArtifactKind::classify(path) {
            ArtifactKind::Drawing | ArtifactKind::Model => Severity::Error,
            ArtifactKind::Document | ArtifactKind::Other if category.is_off_the_shelf() => {
                Severity::Warning
            }
            _ => Severity::Error,
        };
        Self {
            path: path.to_string(),
            kind: IssueKind::Missing,
            severity,
        }
    }

    pub fn mismatch(
        category: ComponentCategory,
        path: &str,
        expected: FileHash,
        actual: FileHash,
    ) -> Self {
        let severity = if category.is_off_the_shelf() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self {
            path: path.to_string(),
            kind: IssueKind::HashMismatch { expected, actual },
            severity,
        }
    }

    pub fn unreadable(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            kind: IssueKind::Unreadable {
                reason: reason.into(),
            },
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "[{}] {}: missing", self.severity, self.path),
            IssueKind::HashMismatch { expected, actual } => write!(
                f,
                "[{}] {}: hash mismatch (recorded {}, found {})",
                self.severity, self.path, expected, actual
            ),
            IssueKind::Unreadable { reason } => {
                write!(f, "[{}] {}: unreadable ({})", self.severity, self.path, reason)
            }
        }
    }
}

/// Aggregated outcome of validating one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub severity: Severity,
    pub checked: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(checked: usize, issues: Vec<ValidationIssue>) -> Self {
        let severity = issues
            .iter()
            .map(|i| i.severity)
            .max()
            .unwrap_or(Severity::Ok);
        Self {
            severity,
            checked,
            issues,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }
}
