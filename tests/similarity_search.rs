use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use mcat_core::manifest::{ComponentCategory, ComponentManifest};
use mech_catalog::config::{load_config, Config};
use mech_catalog::manifest_file::write_manifest;
use mech_catalog::similarity::SimilarityIndex;
use mech_catalog::sync::{SyncOptions, Synchronizer};
use mech_catalog::{db, migrate};
use std::sync::Arc;

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("catalog")).unwrap();

    let config_path = root.join("mcat.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/mcat.sqlite"

[catalog]
root = "{root}/catalog"

[embedding]
provider = "hash"
dims = 256

[index]
cache_path = "{root}/data/components.usearch"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    (tmp, load_config(&config_path).unwrap())
}

fn add_component(config: &Config, dir: &str, identifier: &str, name: &str) {
    let path = config.catalog.root.join(dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("drawing.dxf"), name.as_bytes()).unwrap();
    let mut manifest = ComponentManifest::new(
        format!("id-{}", dir),
        identifier,
        ComponentCategory::Fabricated,
    );
    manifest.name = name.to_string();
    write_manifest(&path.join("component.json"), &manifest).unwrap();
}

async fn index(config: &Config) -> Arc<SimilarityIndex> {
    migrate::run_migrations(config).await.unwrap();
    let pool = db::connect(config).await.unwrap();
    Arc::new(SimilarityIndex::from_config(config, pool).unwrap())
}

async fn sync_with_vectors(config: &Config, similarity: Arc<SimilarityIndex>) {
    let pool = db::connect(config).await.unwrap();
    let summary = Synchronizer::new(&config.catalog, pool)
        .unwrap()
        .with_similarity(similarity)
        .sync_all(
            SyncOptions {
                include_vectors: true,
                ..SyncOptions::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.vectors_upserted, 2);
    assert_eq!(summary.graph_vectors, Some(2));
}

#[tokio::test]
async fn synced_component_is_found() {
    let (_tmp, config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    let similarity = index(&config).await;
    sync_with_vectors(&config, similarity.clone()).await;
    assert!(config.index.cache_path.exists());

    let hits = similarity
        .search("base plate", 0.0, 5, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].entry.component_id, "id-P1");
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn cache_is_reused_by_a_fresh_index() {
    let (_tmp, config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    sync_with_vectors(&config, index(&config).await).await;

    let reopened = index(&config).await;
    let hits = reopened
        .search("ball bearing", 0.0, 5, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(hits[0].entry.component_id, "id-P2");
    assert!(reopened.stats().await.unwrap().graph_loaded);
}

#[tokio::test]
async fn deleted_cache_is_rebuilt_on_search() {
    let (_tmp, config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    sync_with_vectors(&config, index(&config).await).await;

    fs::remove_file(&config.index.cache_path).unwrap();

    let reopened = index(&config).await;
    let hits = reopened
        .search("base plate", 0.0, 5, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(hits[0].entry.component_id, "id-P1");
    assert!(config.index.cache_path.exists());
}

#[tokio::test]
async fn cleared_index_returns_nothing() {
    let (_tmp, config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    let similarity = index(&config).await;
    sync_with_vectors(&config, similarity.clone()).await;

    assert_eq!(similarity.clear().await.unwrap(), 2);
    assert!(!config.index.cache_path.exists());
    let hits = similarity
        .search("base plate", 0.0, 5, &CancellationToken::new())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn disabled_provider_is_rejected() {
    let (_tmp, mut config) = setup();
    config.embedding.provider = "disabled".to_string();
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    assert!(SimilarityIndex::from_config(&config, pool).is_err());
}

#[tokio::test]
async fn removed_component_disappears_from_search_after_plain_sync() {
    let (_tmp, config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    let similarity = index(&config).await;
    sync_with_vectors(&config, similarity.clone()).await;

    fs::remove_dir_all(config.catalog.root.join("P1")).unwrap();
    let pool = db::connect(&config).await.unwrap();
    let summary = Synchronizer::new(&config.catalog, pool)
        .unwrap()
        .with_similarity(similarity.clone())
        .sync_all(SyncOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.pruned, vec!["id-P1".to_string()]);
    assert_eq!(summary.vectors_removed, 1);

    let hits = similarity
        .search("steel base plate", 0.0, 5, &CancellationToken::new())
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.entry.component_id == "id-P2"));
    assert_eq!(similarity.stats().await.unwrap().rows, 1);
}

#[tokio::test]
async fn maintenance_index_works_without_provider() {
    let (_tmp, mut config) = setup();
    add_component(&config, "P1", "BP-1", "steel base plate");
    add_component(&config, "P2", "BR-7", "deep groove ball bearing");
    sync_with_vectors(&config, index(&config).await).await;

    config.embedding.provider = "disabled".to_string();
    let pool = db::connect(&config).await.unwrap();
    let maintenance = SimilarityIndex::for_maintenance(&config, pool);
    let stats = maintenance.stats().await.unwrap();
    assert_eq!(stats.provider, "disabled");
    assert_eq!(stats.rows, 2);

    assert_eq!(maintenance.clear().await.unwrap(), 2);
    assert!(!config.index.cache_path.exists());
    assert_eq!(maintenance.stats().await.unwrap().rows, 0);
}
