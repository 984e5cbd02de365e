//! Vector index records.
//!
//! A [`VectorIndexEntry`] is one persisted row of the vector table: the
//! component it describes, the searchable text that was embedded, and the
//! raw little-endian `f32` embedding bytes.

use serde::Serialize;

use crate::embedding::blob_to_vec;
use crate::manifest::ComponentManifest;

/// Bytes per stored vector component.
pub const BYTES_PER_F32: usize = std::mem::size_of::<f32>();

/// One row of the persisted vector table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorIndexEntry {
    /// Surrogate row id; stable across updates of the same component.
    pub id: i64,
    pub component_id: String,
    pub identifier: String,
    /// The searchable text the embedding was computed from.
    pub content: String,
    #[serde(skip)]
    pub embedding: Vec<u8>,
    pub dims: usize,
    pub category: Option<String>,
    pub asset: Option<String>,
    pub project: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl VectorIndexEntry {
    /// `len(embedding) == dims * 4`
    pub fn is_well_formed(&self) -> bool {
        self.dims > 0 && self.embedding.len() == self.dims * BYTES_PER_F32
    }

    pub fn vector(&self) -> Vec<f32> {
        blob_to_vec(&self.embedding)
    }
}

/// Input to an upsert: who the entry is for and what describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub component_id: String,
    pub identifier: String,
    pub content: String,
    pub category: Option<String>,
    pub asset: Option<String>,
    pub project: Option<String>,
}

impl UpsertRequest {
    /// A request whose identifier defaults to the component id.
    pub fn new(component_id: impl Into<String>, content: impl Into<String>) -> Self {
        let component_id = component_id.into();
        Self {
            identifier: component_id.clone(),
            component_id,
            content: content.into(),
            category: None,
            asset: None,
            project: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// The text that gets embedded: identifier, content, category, asset
    /// and project joined by single spaces, empty fields skipped.
    pub fn search_text(&self) -> String {
        build_search_text(&[
            Some(self.identifier.as_str()),
            Some(self.content.as_str()),
            self.category.as_deref(),
            self.asset.as_deref(),
            self.project.as_deref(),
        ])
    }
}

impl From<&ComponentManifest> for UpsertRequest {
    fn from(manifest: &ComponentManifest) -> Self {
        Self {
            component_id: manifest.id.clone(),
            identifier: manifest.identifier.clone(),
            content: manifest.summary_text(),
            category: Some(manifest.category.as_str().to_string()),
            asset: manifest.asset.clone(),
            project: manifest.project.clone(),
        }
    }
}

/// Join the non-empty, trimmed parts with single spaces.
pub fn build_search_text(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A search result: the full entry plus its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f32,
    #[serde(flatten)]
    pub entry: VectorIndexEntry,
}
