//! Similarity index manager.
//!
//! Owns the vector store, the embedding provider, and the in-memory ANN
//! graph. Every mutation and every graph (re)load happens while holding
//! one async mutex, so the store, the cache file, and the graph never
//! disagree for longer than a single critical section. The graph is never
//! patched in place: writes drop it and delete the cache file, and the
//! next search reloads or rebuilds it.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use mcat_core::embedding::{check_vectors, l2_norm, EmbeddingProvider, ProviderError};
use mcat_core::vector::{SearchHit, UpsertRequest};

use crate::ann_index::{remove_cache, sidecar_path, AnnGraph, GraphSettings};
use crate::config::{Config, IndexConfig};
use crate::embedding::{create_provider, DisabledProvider};
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub provider: String,
    pub dims: usize,
    pub rows: i64,
    /// Rows with the provider's dimension and a well-formed blob.
    pub usable: usize,
    pub graph_loaded: bool,
    pub cache_present: bool,
}

pub struct SimilarityIndex {
    store: VectorStore,
    provider: Arc<dyn EmbeddingProvider>,
    cache_path: PathBuf,
    settings: GraphSettings,
    graph: Mutex<Option<AnnGraph>>,
}

/// Race a provider call against cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = fut => result,
    }
}

impl SimilarityIndex {
    pub fn new(
        store: VectorStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: &IndexConfig,
    ) -> Self {
        Self {
            store,
            provider,
            cache_path: config.cache_path.clone(),
            settings: GraphSettings::from(config),
            graph: Mutex::new(None),
        }
    }

    /// Build the index for `config`, with the configured embedding provider.
    ///
    /// Fails when the provider is disabled.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        if !config.embedding.is_enabled() {
            bail!("Embedding provider is disabled. Set [embedding] provider in the config to use similarity search.");
        }
        let provider = create_provider(&config.embedding)?;
        Ok(Self::new(VectorStore::new(pool), provider, &config.index))
    }

    /// Build an index for work that never embeds: deleting rows, clearing,
    /// stats, orphan cleanup during sync.
    ///
    /// The configured provider is used when it can be created, so `stats`
    /// reports its dimension; otherwise [`DisabledProvider`] stands in.
    pub fn for_maintenance(config: &Config, pool: SqlitePool) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = if config.embedding.is_enabled() {
            create_provider(&config.embedding).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "embedding provider unavailable; index opened without one");
                Arc::new(DisabledProvider)
            })
        } else {
            Arc::new(DisabledProvider)
        };
        Self::new(VectorStore::new(pool), provider, &config.index)
    }

    /// Embed and store one component's entry. Returns its surrogate id.
    pub async fn upsert(&self, request: &UpsertRequest, cancel: &CancellationToken) -> Result<i64> {
        let text = request.search_text();
        let vector = cancellable(cancel, self.provider.embed(&text)).await?;
        check_vectors(
            self.provider.name(),
            1,
            self.provider.dimensions(),
            std::slice::from_ref(&vector),
        )?;

        let mut graph = self.graph.lock().await;
        let id = self.store.put(request, &vector).await?;
        self.invalidate(&mut graph);
        tracing::debug!(component = %request.component_id, id, "vector entry upserted");
        Ok(id)
    }

    /// Embed every request first, then write all rows in one transaction.
    ///
    /// Nothing is written if any embedding fails or the call is cancelled.
    pub async fn upsert_batch(
        &self,
        requests: &[UpsertRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<i64>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = requests.iter().map(UpsertRequest::search_text).collect();
        let vectors = if self.provider.supports_batch() {
            cancellable(cancel, self.provider.embed_batch(&texts)).await?
        } else {
            let mut out = Vec::with_capacity(texts.len());
            for text in &texts {
                out.push(cancellable(cancel, self.provider.embed(text)).await?);
            }
            out
        };
        check_vectors(
            self.provider.name(),
            requests.len(),
            self.provider.dimensions(),
            &vectors,
        )?;

        let rows: Vec<(UpsertRequest, Vec<f32>)> =
            requests.iter().cloned().zip(vectors).collect();

        let mut graph = self.graph.lock().await;
        let ids = self.store.put_many(&rows).await?;
        self.invalidate(&mut graph);
        tracing::debug!(count = ids.len(), "vector entries upserted");
        Ok(ids)
    }

    /// Rebuild the graph from every usable row and rewrite the cache.
    ///
    /// Returns the number of vectors in the new graph.
    pub async fn rebuild(&self) -> Result<usize> {
        let mut graph = self.graph.lock().await;
        self.rebuild_locked(&mut graph).await
    }

    /// Remove one component's entry. Returns whether it existed.
    pub async fn delete_by_component(&self, component_id: &str) -> Result<bool> {
        let mut graph = self.graph.lock().await;
        let removed = self.store.delete_by_component(component_id).await?;
        if removed {
            self.invalidate(&mut graph);
        }
        Ok(removed)
    }

    /// Ids of components that have a vector row but no component record.
    pub async fn orphaned_components(&self) -> Result<Vec<String>> {
        self.store.orphaned_component_ids().await
    }

    /// Remove every entry and the cache.
    pub async fn clear(&self) -> Result<u64> {
        let mut graph = self.graph.lock().await;
        let removed = self.store.clear().await?;
        self.invalidate(&mut graph);
        Ok(removed)
    }

    /// Entries most similar to `query`, best first.
    ///
    /// `score = 1 − cosine distance`, capped at 1.0; hits below `threshold`
    /// are dropped.
    pub async fn search(
        &self,
        query: &str,
        threshold: f32,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 || self.store.count().await? == 0 {
            return Ok(Vec::new());
        }

        let vector = cancellable(cancel, self.provider.embed(query)).await?;
        let dims = self.provider.dimensions();
        check_vectors(
            self.provider.name(),
            1,
            dims,
            std::slice::from_ref(&vector),
        )?;
        if l2_norm(&vector) == 0.0 {
            tracing::debug!("query embedded to a zero vector; nothing can match");
            return Ok(Vec::new());
        }

        let mut graph = self.graph.lock().await;
        self.ensure_graph(&mut graph).await?;

        let first = match graph.as_ref() {
            None => return Ok(Vec::new()),
            Some(g) => g.search(&vector, limit),
        };
        let neighbours = match first {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "ann search failed; rebuilding");
                self.rebuild_locked(&mut graph).await?;
                match graph.as_ref() {
                    Some(g) => g
                        .search(&vector, limit)
                        .map_err(|e| anyhow!("similarity search failed: {}", e))?,
                    None => return Ok(Vec::new()),
                }
            }
        };

        let mut hits = Vec::with_capacity(neighbours.len());
        for (id, distance) in neighbours {
            let score = (1.0 - distance).min(1.0);
            if score.is_nan() || score < threshold {
                continue;
            }
            if let Some(entry) = self.store.get_by_id(id).await? {
                hits.push(SearchHit { score, entry });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let graph = self.graph.lock().await;
        let dims = self.provider.dimensions();
        Ok(IndexStats {
            provider: self.provider.name().to_string(),
            dims,
            rows: self.store.count().await?,
            usable: self.store.usable_ids(dims).await?.len(),
            graph_loaded: graph.is_some(),
            cache_present: self.cache_path.exists() && sidecar_path(&self.cache_path).exists(),
        })
    }

    fn invalidate(&self, graph: &mut MutexGuard<'_, Option<AnnGraph>>) {
        **graph = None;
        remove_cache(&self.cache_path);
    }

    /// Make sure a graph is in memory: load the cache if it matches the
    /// current rows, otherwise rebuild.
    async fn ensure_graph(&self, graph: &mut MutexGuard<'_, Option<AnnGraph>>) -> Result<()> {
        if graph.is_some() {
            return Ok(());
        }

        let dims = self.provider.dimensions();
        let ids = self.store.usable_ids(dims).await?;
        match AnnGraph::load(&self.cache_path, self.settings, dims, &ids) {
            Ok(loaded) => {
                tracing::debug!(vectors = loaded.len(), "ann cache loaded");
                **graph = Some(loaded);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "ann cache unusable; rebuilding");
                remove_cache(&self.cache_path);
                self.rebuild_locked(graph).await.map(|_| ())
            }
        }
    }

    async fn rebuild_locked(&self, graph: &mut MutexGuard<'_, Option<AnnGraph>>) -> Result<usize> {
        let dims = self.provider.dimensions();
        let entries = self.store.list_all().await?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.is_well_formed() || entry.dims != dims {
                tracing::warn!(
                    component = %entry.component_id,
                    dims = entry.dims,
                    expected = dims,
                    "skipping vector row that does not match the provider"
                );
                continue;
            }
            let vector = entry.vector();
            rows.push((entry.id, vector));
        }

        if rows.is_empty() {
            self.invalidate(graph);
            return Ok(0);
        }

        let built = AnnGraph::build(dims, self.settings, &rows)
            .map_err(|e| anyhow!("failed to build similarity graph: {}", e))?;
        if let Err(e) = built.save(&self.cache_path, self.settings) {
            tracing::warn!(error = %e, path = %self.cache_path.display(), "failed to write ann cache");
            remove_cache(&self.cache_path);
        }

        let count = built.len();
        **graph = Some(built);
        tracing::info!(vectors = count, "similarity graph rebuilt");
        Ok(count)
    }
}
