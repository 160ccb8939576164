//! Database migration system
//!
//! Every schema version is applied in its own transaction and recorded in
//! `schema_version`, so a half-applied upgrade is never observed.

use crate::{Error, Result, error::InternalError};
use chrono::Utc;
use sqlx::SqlitePool;

use super::schema::{SCHEMA_V1, SCHEMA_V2};

/// Run all necessary migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_current_version(pool).await?;

    if current_version < 1 {
        apply_migration(pool, 1, SCHEMA_V1).await?;
    }
    if current_version < 2 {
        apply_migration(pool, 2, SCHEMA_V2).await?;
    }

    Ok(())
}

/// Highest applied version, 0 for a fresh database
pub(crate) async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version = sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

fn migration_error(step: &str, version: i32, e: sqlx::Error) -> Error {
    Error::Internal(InternalError::database(format!(
        "Migration {version}: failed to {step}: {e}"
    )))
}

async fn apply_migration(pool: &SqlitePool, version: i32, sql: &str) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| migration_error("begin", version, e))?;

    sqlx::raw_sql(sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| migration_error("apply", version, e))?;
    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
        .bind(version)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| migration_error("record", version, e))?;

    tx.commit()
        .await
        .map_err(|e| migration_error("commit", version, e))?;

    log::debug!("Applied schema migration {version}");
    Ok(())
}

pub(crate) async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
