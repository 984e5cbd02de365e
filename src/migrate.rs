use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Mirror of the applied component manifests
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS components (
            id TEXT PRIMARY KEY,
            identifier TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            description TEXT,
            asset TEXT,
            project TEXT,
            version TEXT NOT NULL,
            directory TEXT NOT NULL UNIQUE,
            current_hash TEXT,
            synced_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS component_artifacts (
            component_id TEXT NOT NULL,
            path TEXT NOT NULL,
            hash TEXT,
            PRIMARY KEY (component_id, path),
            FOREIGN KEY (component_id) REFERENCES components(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // System of record for embeddings; the ANN cache is derived from it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_index (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            component_id TEXT NOT NULL UNIQUE,
            identifier TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            category TEXT,
            asset TEXT,
            project TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_components_identifier ON components(identifier)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_component_artifacts_component ON component_artifacts(component_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
