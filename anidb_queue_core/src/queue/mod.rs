//! Persisted, priority-ordered command queue
//!
//! [`PersistedQueue`] sits between producers and the per-partition
//! processors. It owns the durable records (through a [`CommandStore`]), the
//! per-partition pause flags, and the wake-up signals.

pub mod store;

use crate::commands::CommandRequest;
use crate::error::{Error, FailureKind, Result, ValidationError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

pub use store::{
    ClaimFilter, CommandStore, EnqueueOutcome, MemoryCommandStore, NewCommand, QueueStats,
    StoredCommand,
};

/// Independent queue lane with its own worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// AniDB-bound commands, UDP and HTTP
    General,
    Hasher,
    Images,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::General, Partition::Hasher, Partition::Images];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::General => "general",
            Partition::Hasher => "hasher",
            Partition::Images => "images",
        }
    }

    fn index(&self) -> usize {
        match self {
            Partition::General => 0,
            Partition::Hasher => 1,
            Partition::Images => 2,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "general" | "anidb" => Ok(Partition::General),
            "hasher" | "hashing" => Ok(Partition::Hasher),
            "images" | "image" => Ok(Partition::Images),
            other => Err(ValidationError::invalid_parameter(
                "partition",
                &format!("unknown partition '{other}' (expected general, hasher or images)"),
            )
            .into()),
        }
    }
}

/// Command urgency; 1 is the most urgent, 11 the default lowest tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(11);

    pub fn new(value: u8) -> Result<Self> {
        if (Self::HIGHEST.0..=Self::LOWEST.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::invalid_parameter("priority", "must be between 1 and 11").into())
        }
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Catalog defaults, which are known to be in range
    pub(crate) const fn fixed(value: u8) -> Self {
        Self(value)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a persisted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    /// Held by a processor
    Claimed,
    /// Parked after a recoverable failure
    Failed,
}

struct Lane {
    paused: AtomicBool,
    notify: Arc<Notify>,
}

impl Lane {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// The queue shared by producers and processors
pub struct PersistedQueue {
    store: Arc<dyn CommandStore>,
    lanes: [Lane; 3],
}

impl PersistedQueue {
    pub fn new(store: Arc<dyn CommandStore>) -> Self {
        Self {
            store,
            lanes: [Lane::new(), Lane::new(), Lane::new()],
        }
    }

    /// Queue backed by [`MemoryCommandStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCommandStore::new()))
    }

    fn lane(&self, partition: Partition) -> &Lane {
        &self.lanes[partition.index()]
    }

    /// Persist `request` unless an equivalent command is queued
    ///
    /// `priority` overrides the command's default tier.
    pub async fn enqueue(
        &self,
        request: &CommandRequest,
        priority: Option<Priority>,
    ) -> Result<EnqueueOutcome> {
        let command = NewCommand {
            partition: request.partition(),
            command_type: request.type_name().to_string(),
            command_key: request.key(),
            priority: priority.unwrap_or_else(|| request.default_priority()),
            payload: serde_json::to_string(request)?,
        };
        let outcome = self.store.insert_if_absent(&command).await?;
        match outcome {
            EnqueueOutcome::Inserted(id) => debug!(
                "Queued {} #{id} on {} (priority {})",
                command.command_key, command.partition, command.priority
            ),
            EnqueueOutcome::Existing(id) => {
                debug!("{} already queued as #{id}", command.command_key)
            }
        }
        self.notify(command.partition);
        Ok(outcome)
    }

    /// Claim the most urgent pending command; `None` when empty or paused
    pub async fn claim_next(
        &self,
        partition: Partition,
        filter: &ClaimFilter,
    ) -> Result<Option<StoredCommand>> {
        if self.is_paused(partition) {
            return Ok(None);
        }
        self.store.claim_next(partition, filter).await
    }

    /// Remove a finished command
    pub async fn complete(&self, command: &StoredCommand) -> Result<()> {
        self.store.delete(command.id).await
    }

    /// Record a failure; returns how it was classified
    ///
    /// Transient failures park the command, bans put it back for after the
    /// unban, and everything else drops it.
    pub async fn fail(&self, command: &StoredCommand, error: &Error) -> Result<FailureKind> {
        let kind = error.failure_kind();
        let message = error.to_string();
        match kind {
            FailureKind::Transient => {
                warn!("{} parked after error: {message}", command.command_key);
                self.store.mark_failed(command.id, &message).await?;
            }
            FailureKind::Banned => {
                warn!("{} postponed by ban: {message}", command.command_key);
                self.store.release(command.id, &message).await?;
            }
            FailureKind::InvalidSession | FailureKind::Fatal => {
                warn!("{} dropped: {message}", command.command_key);
                self.store.delete(command.id).await?;
            }
        }
        Ok(kind)
    }

    pub fn pause(&self, partition: Partition) {
        if !self.lane(partition).paused.swap(true, Ordering::SeqCst) {
            info!("Queue {partition} paused");
        }
    }

    pub fn resume(&self, partition: Partition) {
        if self.lane(partition).paused.swap(false, Ordering::SeqCst) {
            info!("Queue {partition} resumed");
        }
        self.notify(partition);
    }

    pub fn is_paused(&self, partition: Partition) -> bool {
        self.lane(partition).paused.load(Ordering::SeqCst)
    }

    /// Wake the worker of `partition`
    pub fn notify(&self, partition: Partition) {
        self.lane(partition).notify.notify_one();
    }

    pub fn notifier(&self, partition: Partition) -> Arc<Notify> {
        self.lane(partition).notify.clone()
    }

    /// Pending plus in-flight commands
    pub async fn count(&self, partition: Partition) -> Result<u64> {
        Ok(self.store.stats(partition).await?.depth())
    }

    pub async fn stats(&self, partition: Partition) -> Result<QueueStats> {
        self.store.stats(partition).await
    }

    pub async fn list(&self, partition: Partition, limit: usize) -> Result<Vec<StoredCommand>> {
        self.store.list(partition, limit).await
    }

    pub async fn recover_claims(&self) -> Result<u64> {
        let recovered = self.store.recover_claims().await?;
        if recovered > 0 {
            info!("Recovered {recovered} commands claimed by a previous run");
        }
        Ok(recovered)
    }

    pub async fn requeue_failed(&self, partition: Option<Partition>) -> Result<u64> {
        let requeued = self.store.requeue_failed(partition).await?;
        match partition {
            Some(p) => self.notify(p),
            None => Partition::ALL.iter().for_each(|p| self.notify(*p)),
        }
        Ok(requeued)
    }
}
