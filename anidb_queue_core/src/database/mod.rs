//! SQLite persistence
//!
//! One database file holds the command queue and the entity documents the
//! commands produce. Opening it applies any pending migrations.

pub mod command_store;
pub mod entity_store;
pub mod migrations;
pub mod schema;

use crate::{
    Error, Result,
    error::{InternalError, IoError},
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use command_store::SqliteCommandStore;
pub use entity_store::SqliteEntityStore;

/// Database connection manager with connection pooling
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create the database at `db_path` and migrate it
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(IoError::from_std(e).with_path(parent)))?;
        }

        // WAL lets status readers run while a processor writes
        let connect_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                Error::Internal(InternalError::database(format!(
                    "Failed to connect to database: {e}"
                )))
            })?;

        let db = Self { pool };
        migrations::run_migrations(&db.pool).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn command_store(&self) -> SqliteCommandStore {
        SqliteCommandStore::new(self.pool.clone())
    }

    pub fn entity_store(&self) -> SqliteEntityStore {
        SqliteEntityStore::new(self.pool.clone())
    }

    /// Row counts for status output
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let command_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM command_requests")
            .fetch_one(&self.pool)
            .await?;

        let failed_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM command_requests WHERE status = 'failed'",
        )
        .fetch_one(&self.pool)
        .await?;

        let entity_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            command_count: command_count as u64,
            failed_count: failed_count as u64,
            entity_count: entity_count as u64,
        })
    }

    /// Wait for pooled connections to finish and close them
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub command_count: u64,
    pub failed_count: u64,
    pub entity_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::DocumentStore;
    use tempfile::TempDir;

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let db = Database::new(&db_path).await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_database_creates_parent_directory() {
        let (_db, temp_dir) = create_test_db().await;
        assert!(temp_dir.path().join("nested").join("test.db").exists());
    }

    #[tokio::test]
    async fn test_database_stats() {
        let (db, _temp_dir) = create_test_db().await;
        assert_eq!(db.stats().await.unwrap(), DatabaseStats::default());

        db.entity_store()
            .put_document("anime", "1", "{}".to_string())
            .await
            .unwrap();
        assert_eq!(db.stats().await.unwrap().entity_count, 1);
    }
}
