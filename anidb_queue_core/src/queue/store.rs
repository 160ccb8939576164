//! Durable command storage

use crate::error::Result;
use crate::queue::{CommandStatus, Partition, Priority};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A command ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCommand {
    pub partition: Partition,
    pub command_type: String,
    pub command_key: String,
    pub priority: Priority,
    /// Serialized parameters
    pub payload: String,
}

/// A persisted command
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCommand {
    pub id: i64,
    pub partition: Partition,
    pub command_type: String,
    pub command_key: String,
    pub priority: Priority,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub status: CommandStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
}

/// Result of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted(i64),
    /// An equivalent command was already queued
    Existing(i64),
}

impl EnqueueOutcome {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Existing(id) => *id,
        }
    }
}

/// Command types that must not be claimed right now
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub excluded_types: Vec<&'static str>,
}

impl ClaimFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn excluding(types: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            excluded_types: types.into_iter().collect(),
        }
    }

    pub fn allows(&self, command_type: &str) -> bool {
        !self.excluded_types.contains(&command_type)
    }
}

/// Row counts of one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub claimed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Commands not yet executed: pending plus in flight
    pub fn depth(&self) -> u64 {
        self.pending + self.claimed
    }
}

/// Persistence boundary of the queue
///
/// Implementations must make `claim_next` an atomic read-and-mark, so that a
/// row is never handed out twice.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Insert unless (type, key) exists; a parked duplicate goes back to pending
    async fn insert_if_absent(&self, command: &NewCommand) -> Result<EnqueueOutcome>;

    /// Mark and return the most urgent pending command of `partition`
    async fn claim_next(
        &self,
        partition: Partition,
        filter: &ClaimFilter,
    ) -> Result<Option<StoredCommand>>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Park a claimed command with its error
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;

    /// Return a claimed command to pending, counting the error
    async fn release(&self, id: i64, error: &str) -> Result<()>;

    /// Return every claimed command to pending; used at start-up
    async fn recover_claims(&self) -> Result<u64>;

    /// Move parked commands back to pending
    async fn requeue_failed(&self, partition: Option<Partition>) -> Result<u64>;

    async fn stats(&self, partition: Partition) -> Result<QueueStats>;

    /// Commands of `partition` in claim order, for display
    async fn list(&self, partition: Partition, limit: usize) -> Result<Vec<StoredCommand>>;
}

/// [`CommandStore`] in a map; state is lost on exit
#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    inner: Mutex<MemoryRows>,
}

#[derive(Debug, Default)]
struct MemoryRows {
    next_id: i64,
    rows: BTreeMap<i64, StoredCommand>,
}

impl MemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRows> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn claim_order(row: &StoredCommand) -> (Priority, DateTime<Utc>, i64) {
    (row.priority, row.created_at, row.id)
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn insert_if_absent(&self, command: &NewCommand) -> Result<EnqueueOutcome> {
        let mut inner = self.lock();
        if let Some(existing) = inner.rows.values_mut().find(|row| {
            row.command_type == command.command_type && row.command_key == command.command_key
        }) {
            if existing.status == CommandStatus::Failed {
                existing.status = CommandStatus::Pending;
            }
            return Ok(EnqueueOutcome::Existing(existing.id));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            StoredCommand {
                id,
                partition: command.partition,
                command_type: command.command_type.clone(),
                command_key: command.command_key.clone(),
                priority: command.priority,
                payload: command.payload.clone(),
                created_at: Utc::now(),
                status: CommandStatus::Pending,
                error_count: 0,
                last_error: None,
            },
        );
        Ok(EnqueueOutcome::Inserted(id))
    }

    async fn claim_next(
        &self,
        partition: Partition,
        filter: &ClaimFilter,
    ) -> Result<Option<StoredCommand>> {
        let mut inner = self.lock();
        let next = inner
            .rows
            .values()
            .filter(|row| {
                row.partition == partition
                    && row.status == CommandStatus::Pending
                    && filter.allows(&row.command_type)
            })
            .min_by_key(|row| claim_order(row))
            .map(|row| row.id);

        Ok(next.and_then(|id| {
            let row = inner.rows.get_mut(&id)?;
            row.status = CommandStatus::Claimed;
            Some(row.clone())
        }))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.lock().rows.remove(&id);
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        if let Some(row) = self.lock().rows.get_mut(&id) {
            row.status = CommandStatus::Failed;
            row.error_count += 1;
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn release(&self, id: i64, error: &str) -> Result<()> {
        if let Some(row) = self.lock().rows.get_mut(&id) {
            row.status = CommandStatus::Pending;
            row.error_count += 1;
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn recover_claims(&self) -> Result<u64> {
        let mut inner = self.lock();
        let mut recovered = 0;
        for row in inner.rows.values_mut() {
            if row.status == CommandStatus::Claimed {
                row.status = CommandStatus::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn requeue_failed(&self, partition: Option<Partition>) -> Result<u64> {
        let mut inner = self.lock();
        let mut requeued = 0;
        for row in inner.rows.values_mut() {
            if row.status == CommandStatus::Failed && partition.is_none_or(|p| p == row.partition)
            {
                row.status = CommandStatus::Pending;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn stats(&self, partition: Partition) -> Result<QueueStats> {
        let inner = self.lock();
        let mut stats = QueueStats::default();
        for row in inner.rows.values().filter(|r| r.partition == partition) {
            match row.status {
                CommandStatus::Pending => stats.pending += 1,
                CommandStatus::Claimed => stats.claimed += 1,
                CommandStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn list(&self, partition: Partition, limit: usize) -> Result<Vec<StoredCommand>> {
        let inner = self.lock();
        let mut rows: Vec<StoredCommand> = inner
            .rows
            .values()
            .filter(|r| r.partition == partition)
            .cloned()
            .collect();
        rows.sort_by_key(claim_order);
        rows.truncate(limit);
        Ok(rows)
    }
}
