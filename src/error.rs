//! Typed errors for artifact integrity work.
//!
//! These are reported per component and never abort a whole sync batch.
//! Embedding failures use [`mcat_core::embedding::ProviderError`]; cache
//! problems in the ANN layer are recovered internally and have no public
//! error type.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("artifact file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest '{}' is unreadable: {reason}", path.display())]
    ManifestUnreadable { path: PathBuf, reason: String },

    #[error("refusing to write invalid manifest '{}': {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("failed to write manifest '{}': {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IntegrityError {
    /// Classify an I/O failure on `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Stable code for machine-readable reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::Io { .. } => "IO_FAILURE",
            Self::ManifestUnreadable { .. } => "MANIFEST_UNREADABLE",
            Self::ManifestInvalid { .. } => "MANIFEST_INVALID",
            Self::ManifestWrite { .. } => "MANIFEST_WRITE_FAILED",
        }
    }
}
