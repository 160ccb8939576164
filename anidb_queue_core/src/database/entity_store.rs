//! SQLite-backed entity documents

use crate::Result;
use crate::repositories::DocumentStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

/// [`DocumentStore`] over the `entities` table; every repository trait is
/// available on it
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored documents of `kind`
    pub async fn count(&self, kind: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM entities WHERE kind = ?")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl DocumentStore for SqliteEntityStore {
    async fn put_document(&self, kind: &str, key: &str, json: String) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (kind, key, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind)
        .bind(key)
        .bind(json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let data =
            sqlx::query_scalar::<_, String>("SELECT data FROM entities WHERE kind = ? AND key = ?")
                .bind(kind)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data)
    }

    async fn list_documents(&self, kind: &str) -> Result<Vec<String>> {
        let data = sqlx::query_scalar::<_, String>(
            "SELECT data FROM entities WHERE kind = ? ORDER BY key ASC",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(data)
    }

    async fn delete_document(&self, kind: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM entities WHERE kind = ? AND key = ?")
            .bind(kind)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
