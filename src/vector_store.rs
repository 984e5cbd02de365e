//! Persisted vector rows in SQLite.
//!
//! The `vector_index` table is the system of record for embeddings. The ANN
//! graph in [`crate::ann_index`] is derived from it and can always be
//! rebuilt from [`VectorStore::list_all`].

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use mcat_core::embedding::vec_to_blob;
use mcat_core::vector::{UpsertRequest, VectorIndexEntry};

const SELECT_COLUMNS: &str = "id, component_id, identifier, content, embedding, dims, \
                              category, asset, project, created_at, updated_at";

#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update the row for `request.component_id`.
    ///
    /// The surrogate id of an existing row is preserved. Returns the id.
    pub async fn put(&self, request: &UpsertRequest, vector: &[f32]) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        put_row(&mut conn, request, vector, chrono::Utc::now().timestamp()).await
    }

    /// Write several rows in one transaction.
    pub async fn put_many(&self, rows: &[(UpsertRequest, Vec<f32>)]) -> Result<Vec<i64>> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        for (request, vector) in rows {
            ids.push(put_row(&mut tx, request, vector, now).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Returns whether a row was removed.
    pub async fn delete_by_component(&self, component_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vector_index WHERE component_id = ?")
            .bind(component_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every row. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vector_index")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All rows ordered by surrogate id ascending.
    ///
    /// The ANN id map relies on this order; rebuild and cache validation
    /// both read through here.
    pub async fn list_all(&self) -> Result<Vec<VectorIndexEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vector_index ORDER BY id ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_entry).collect())
    }

    /// Ids of well-formed rows with `dims` dimensions, in the same order
    /// as [`list_all`](Self::list_all).
    pub async fn usable_ids(&self, dims: usize) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM vector_index WHERE dims = ? AND length(embedding) = dims * 4 ORDER BY id ASC",
        )
        .bind(dims as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Component ids of rows with no matching `components` record.
    pub async fn orphaned_component_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT v.component_id FROM vector_index v
            WHERE NOT EXISTS (SELECT 1 FROM components c WHERE c.id = v.component_id)
            ORDER BY v.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<VectorIndexEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vector_index WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_entry))
    }
}

async fn put_row(
    conn: &mut SqliteConnection,
    request: &UpsertRequest,
    vector: &[f32],
    now: i64,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO vector_index
            (component_id, identifier, content, embedding, dims,
             category, asset, project, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(component_id) DO UPDATE SET
            identifier = excluded.identifier,
            content = excluded.content,
            embedding = excluded.embedding,
            dims = excluded.dims,
            category = excluded.category,
            asset = excluded.asset,
            project = excluded.project,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&request.component_id)
    .bind(&request.identifier)
    .bind(request.search_text())
    .bind(vec_to_blob(vector))
    .bind(vector.len() as i64)
    .bind(&request.category)
    .bind(&request.asset)
    .bind(&request.project)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

fn row_to_entry(row: &SqliteRow) -> VectorIndexEntry {
    let dims: i64 = row.get("dims");
    VectorIndexEntry {
        id: row.get("id"),
        component_id: row.get("component_id"),
        identifier: row.get("identifier"),
        content: row.get("content"),
        embedding: row.get("embedding"),
        dims: dims.max(0) as usize,
        category: row.get("category"),
        asset: row.get("asset"),
        project: row.get("project"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
