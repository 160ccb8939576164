//! SQLite-backed command store

use crate::Result;
use crate::error::InternalError;
use crate::queue::{
    ClaimFilter, CommandStatus, CommandStore, EnqueueOutcome, NewCommand, Partition, Priority,
    QueueStats, StoredCommand,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

const COLUMNS: &str = "id, partition, command_type, command_key, priority, payload, \
                       created_at, status, error_count, last_error";

/// [`CommandStore`] over the `command_requests` table
#[derive(Clone)]
pub struct SqliteCommandStore {
    pool: SqlitePool,
}

impl SqliteCommandStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_command(row: &sqlx::sqlite::SqliteRow) -> Result<StoredCommand> {
        let priority: i64 = row.try_get("priority")?;
        let priority = u8::try_from(priority)
            .map_err(|_| InternalError::database(format!("priority {priority} out of range")))?;
        let created_at: i64 = row.try_get("created_at")?;
        let error_count: i64 = row.try_get("error_count")?;

        Ok(StoredCommand {
            id: row.try_get("id")?,
            partition: row.try_get("partition")?,
            command_type: row.try_get("command_type")?,
            command_key: row.try_get("command_key")?,
            priority: Priority::new(priority)?,
            payload: row.try_get("payload")?,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
            status: row.try_get("status")?,
            error_count: error_count.max(0) as u32,
            last_error: row.try_get("last_error")?,
        })
    }

    async fn set_status_with_error(
        &self,
        id: i64,
        status: CommandStatus,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE command_requests
            SET status = ?, error_count = error_count + 1, last_error = ?, claimed_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandStore for SqliteCommandStore {
    async fn insert_if_absent(&self, command: &NewCommand) -> Result<EnqueueOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO command_requests
                (partition, command_type, command_key, priority, payload, created_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(command_type, command_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(command.partition)
        .bind(&command.command_type)
        .bind(&command.command_key)
        .bind(i64::from(command.priority.value()))
        .bind(&command.payload)
        .bind(Utc::now().timestamp_millis())
        .bind(CommandStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(id) => EnqueueOutcome::Inserted(id),
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM command_requests WHERE command_type = ? AND command_key = ?",
                )
                .bind(&command.command_type)
                .bind(&command.command_key)
                .fetch_one(&mut *tx)
                .await?;
                sqlx::query("UPDATE command_requests SET status = ? WHERE id = ? AND status = ?")
                    .bind(CommandStatus::Pending)
                    .bind(id)
                    .bind(CommandStatus::Failed)
                    .execute(&mut *tx)
                    .await?;
                EnqueueOutcome::Existing(id)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn claim_next(
        &self,
        partition: Partition,
        filter: &ClaimFilter,
    ) -> Result<Option<StoredCommand>> {
        let exclusion = if filter.excluded_types.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; filter.excluded_types.len()].join(", ");
            format!("AND command_type NOT IN ({placeholders})")
        };
        let sql = format!(
            r#"
            UPDATE command_requests
            SET status = ?, claimed_at = ?
            WHERE id = (
                SELECT id FROM command_requests
                WHERE partition = ? AND status = ? {exclusion}
                ORDER BY priority ASC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        );

        let mut query = sqlx::query(&sql)
            .bind(CommandStatus::Claimed)
            .bind(Utc::now().timestamp_millis())
            .bind(partition)
            .bind(CommandStatus::Pending);
        for command_type in &filter.excluded_types {
            query = query.bind(*command_type);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::row_to_command(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM command_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        self.set_status_with_error(id, CommandStatus::Failed, error)
            .await
    }

    async fn release(&self, id: i64, error: &str) -> Result<()> {
        self.set_status_with_error(id, CommandStatus::Pending, error)
            .await
    }

    async fn recover_claims(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE command_requests SET status = ?, claimed_at = NULL WHERE status = ?",
        )
        .bind(CommandStatus::Pending)
        .bind(CommandStatus::Claimed)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn requeue_failed(&self, partition: Option<Partition>) -> Result<u64> {
        let result = match partition {
            Some(partition) => {
                sqlx::query(
                    "UPDATE command_requests SET status = ? WHERE status = ? AND partition = ?",
                )
                .bind(CommandStatus::Pending)
                .bind(CommandStatus::Failed)
                .bind(partition)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE command_requests SET status = ? WHERE status = ?")
                    .bind(CommandStatus::Pending)
                    .bind(CommandStatus::Failed)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn stats(&self, partition: Partition) -> Result<QueueStats> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM command_requests
            WHERE partition = ?
            GROUP BY status
            "#,
        )
        .bind(partition)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: CommandStatus = row.try_get("status")?;
            let count = row.try_get::<i64, _>("count")? as u64;
            match status {
                CommandStatus::Pending => stats.pending = count,
                CommandStatus::Claimed => stats.claimed = count,
                CommandStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    async fn list(&self, partition: Partition, limit: usize) -> Result<Vec<StoredCommand>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM command_requests
            WHERE partition = ?
            ORDER BY priority ASC, created_at ASC, id ASC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(partition)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_command).collect()
    }
}
