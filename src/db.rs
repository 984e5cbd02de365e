//! SQLite pool for the catalogue database.
//!
//! `mcat` is a single process doing one sync or query at a time, so the
//! pool holds one connection. Every write goes through it in order and
//! nothing waits on a second connection that SQLite would lock out anyway.
//! A busy timeout covers other `mcat` processes pointed at the same file.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the configured database, creating the file and its parent
/// directories on first use.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    open(&config.db.path).await
}

async fn open(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(path))
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_nested_database_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("nested").join("mcat.sqlite");

        let pool = open(&path).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        assert!(path.is_file());

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mcat.sqlite");

        let pool = open(&path).await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES (7)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = open(&path).await.unwrap();
        let v: i64 = sqlx::query_scalar("SELECT v FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
