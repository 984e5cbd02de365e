//! HNSW graph over the vector rows, cached on disk.
//!
//! The graph is keyed by position: the vector added `k`-th gets key `k`,
//! and `id_map[k]` holds the surrogate row id. Rows are always fed in
//! `id ASC` order so a graph rebuilt from the same rows has the same map.
//!
//! On disk the graph is a usearch file plus a JSON sidecar
//! (`<cache>.meta.json`) recording the format version, dimensions, row
//! count, and a fingerprint of the id map. A cache whose sidecar does not
//! match the current rows is rejected and rebuilt by the caller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use mcat_core::hash_text;

use crate::config::IndexConfig;

const CACHE_FORMAT_VERSION: u32 = 1;

/// Why a cache could not be used. Never leaves the similarity layer.
#[derive(Debug, Error)]
pub(crate) enum CacheError {
    #[error("cache file not present")]
    Missing,
    #[error("cache i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache header unreadable: {0}")]
    Header(String),
    #[error("cache is stale: {0}")]
    Stale(String),
    #[error("ann engine error: {0}")]
    Engine(String),
}

fn engine_err(context: &str, e: impl std::fmt::Display) -> CacheError {
    CacheError::Engine(format!("{}: {}", context, e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GraphSettings {
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl From<&IndexConfig> for GraphSettings {
    fn from(config: &IndexConfig) -> Self {
        Self {
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
        }
    }
}

impl GraphSettings {
    fn options(&self, dims: usize) -> IndexOptions {
        IndexOptions {
            dimensions: dims,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct CacheHeader {
    format_version: u32,
    dims: usize,
    count: usize,
    connectivity: usize,
    fingerprint: String,
}

/// Fingerprint of an ordered id list.
fn fingerprint(ids: &[i64]) -> String {
    let joined = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    hash_text(&joined).to_string()
}

pub(crate) fn sidecar_path(cache_path: &Path) -> PathBuf {
    let mut name = cache_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    cache_path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Delete the cache file and its sidecar. Absent files are fine.
pub(crate) fn remove_cache(cache_path: &Path) {
    for path in [cache_path.to_path_buf(), sidecar_path(cache_path)] {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed ann cache file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove ann cache file"),
        }
    }
}

pub(crate) struct AnnGraph {
    index: Index,
    id_map: Vec<i64>,
    dims: usize,
}

impl AnnGraph {
    /// Build a graph from `(surrogate id, vector)` pairs in the given order.
    pub fn build(
        dims: usize,
        settings: GraphSettings,
        rows: &[(i64, Vec<f32>)],
    ) -> Result<Self, CacheError> {
        let index = Index::new(&settings.options(dims)).map_err(|e| engine_err("create", e))?;
        index
            .reserve(rows.len())
            .map_err(|e| engine_err("reserve", e))?;

        let mut id_map = Vec::with_capacity(rows.len());
        for (position, (id, vector)) in rows.iter().enumerate() {
            index
                .add(position as u64, vector.as_slice())
                .map_err(|e| engine_err("add", e))?;
            id_map.push(*id);
        }

        Ok(Self {
            index,
            id_map,
            dims,
        })
    }

    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    /// Write the graph and its sidecar, each via temp file + rename.
    pub fn save(&self, cache_path: &Path, settings: GraphSettings) -> Result<(), CacheError> {
        if let Some(parent) = cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(cache_path);
        if let Err(e) = self.index.save(&tmp.to_string_lossy()) {
            let _ = fs::remove_file(&tmp);
            return Err(engine_err("save", e));
        }
        fs::rename(&tmp, cache_path)?;

        let header = CacheHeader {
            format_version: CACHE_FORMAT_VERSION,
            dims: self.dims,
            count: self.id_map.len(),
            connectivity: settings.connectivity,
            fingerprint: fingerprint(&self.id_map),
        };
        let json = serde_json::to_vec_pretty(&header)
            .map_err(|e| CacheError::Header(e.to_string()))?;
        let sidecar = sidecar_path(cache_path);
        let tmp = temp_path(&sidecar);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &sidecar)?;
        Ok(())
    }

    /// Load a cached graph, accepting it only if it was built over exactly
    /// `ids` (in order) with vectors of `dims` dimensions.
    pub fn load(
        cache_path: &Path,
        settings: GraphSettings,
        dims: usize,
        ids: &[i64],
    ) -> Result<Self, CacheError> {
        let sidecar = sidecar_path(cache_path);
        if !cache_path.exists() || !sidecar.exists() {
            return Err(CacheError::Missing);
        }

        let raw = fs::read(&sidecar)?;
        let header: CacheHeader =
            serde_json::from_slice(&raw).map_err(|e| CacheError::Header(e.to_string()))?;

        if header.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Stale(format!(
                "format version {}",
                header.format_version
            )));
        }
        if header.dims != dims {
            return Err(CacheError::Stale(format!(
                "dims {} != {}",
                header.dims, dims
            )));
        }
        if header.count != ids.len() {
            return Err(CacheError::Stale(format!(
                "count {} != {}",
                header.count,
                ids.len()
            )));
        }
        if header.connectivity != settings.connectivity {
            return Err(CacheError::Stale("connectivity changed".to_string()));
        }
        if header.fingerprint != fingerprint(ids) {
            return Err(CacheError::Stale("id set changed".to_string()));
        }

        let index = Index::new(&settings.options(dims)).map_err(|e| engine_err("create", e))?;
        index
            .load(&cache_path.to_string_lossy())
            .map_err(|e| engine_err("load", e))?;

        if index.size() != ids.len() || index.dimensions() != dims {
            return Err(CacheError::Stale(format!(
                "graph holds {} vectors of {} dims",
                index.size(),
                index.dimensions()
            )));
        }
        index.change_expansion_search(settings.expansion_search);

        Ok(Self {
            index,
            id_map: ids.to_vec(),
            dims,
        })
    }

    /// Nearest neighbours as `(surrogate id, cosine distance)`, closest first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(i64, f32)>, CacheError> {
        if self.id_map.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(CacheError::Stale(format!(
                "query has {} dims, graph has {}",
                query.len(),
                self.dims
            )));
        }

        let k = limit.min(self.id_map.len());
        let matches = self
            .index
            .search(query, k)
            .map_err(|e| engine_err("search", e))?;

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                self.id_map
                    .get(*key as usize)
                    .map(|id| (*id, *distance))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> GraphSettings {
        GraphSettings::from(&IndexConfig::default())
    }

    fn rows() -> Vec<(i64, Vec<f32>)> {
        vec![
            (3, vec![1.0, 0.0, 0.0]),
            (7, vec![0.0, 1.0, 0.0]),
            (9, vec![0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn sidecar_sits_next_to_cache() {
        let p = Path::new("/data/components.usearch");
        assert_eq!(
            sidecar_path(p),
            PathBuf::from("/data/components.usearch.meta.json")
        );
    }

    #[test]
    fn search_maps_positions_to_ids() {
        let graph = AnnGraph::build(3, settings(), &rows()).unwrap();
        assert_eq!(graph.len(), 3);
        let hits = graph.search(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, 7);
        assert!(hits[0].1.abs() < 1e-4);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache").join("g.usearch");
        let graph = AnnGraph::build(3, settings(), &rows()).unwrap();
        graph.save(&path, settings()).unwrap();
        assert!(sidecar_path(&path).exists());

        let loaded = AnnGraph::load(&path, settings(), 3, &[3, 7, 9]).unwrap();
        assert_eq!(loaded.len(), 3);
        let hits = loaded.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].0, 9);
    }

    #[test]
    fn reload_rejects_different_ids_or_dims() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("g.usearch");
        AnnGraph::build(3, settings(), &rows())
            .unwrap()
            .save(&path, settings())
            .unwrap();

        assert!(matches!(
            AnnGraph::load(&path, settings(), 3, &[3, 9, 7]),
            Err(CacheError::Stale(_))
        ));
        assert!(matches!(
            AnnGraph::load(&path, settings(), 4, &[3, 7, 9]),
            Err(CacheError::Stale(_))
        ));
        assert!(matches!(
            AnnGraph::load(&path, settings(), 3, &[3, 7]),
            Err(CacheError::Stale(_))
        ));
    }

    #[test]
    fn corrupt_or_missing_cache_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("g.usearch");
        assert!(matches!(
            AnnGraph::load(&path, settings(), 3, &[1]),
            Err(CacheError::Missing)
        ));

        std::fs::write(&path, b"garbage").unwrap();
        std::fs::write(sidecar_path(&path), b"{").unwrap();
        assert!(matches!(
            AnnGraph::load(&path, settings(), 3, &[1]),
            Err(CacheError::Header(_))
        ));

        remove_cache(&path);
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());
    }
}
