//! The three partition processors behind one control surface

use crate::commands::{CommandContext, CommandRequest};
use crate::error::Result;
use crate::processor::{ProcessorState, QueueProcessor};
use crate::queue::{EnqueueOutcome, Partition, PersistedQueue, Priority};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStatus {
    pub partition: Partition,
    pub state: String,
    pub message: String,
    pub current: Option<String>,
    /// Pending plus in-flight commands
    pub depth: u64,
    /// Parked after a recoverable failure
    pub failed: u64,
    pub paused: bool,
}

/// Snapshot of every partition and the session flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub partitions: Vec<PartitionStatus>,
    pub logged_in: bool,
    pub banned: bool,
    pub ban_time: Option<DateTime<Utc>>,
    pub invalid_session: bool,
}

impl QueueStatus {
    pub fn partition(&self, partition: Partition) -> Option<&PartitionStatus> {
        self.partitions.iter().find(|p| p.partition == partition)
    }
}

/// Owns one processor per partition
pub struct CommandQueues {
    ctx: CommandContext,
    processors: Vec<QueueProcessor>,
}

impl CommandQueues {
    pub fn new(ctx: CommandContext) -> Self {
        let processors = Partition::ALL
            .iter()
            .map(|p| QueueProcessor::new(*p, ctx.clone()))
            .collect();
        Self { ctx, processors }
    }

    pub fn queue(&self) -> &Arc<PersistedQueue> {
        &self.ctx.queue
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    pub fn processor(&self, partition: Partition) -> &QueueProcessor {
        // Built from Partition::ALL, so every partition is present
        &self.processors[Partition::ALL
            .iter()
            .position(|p| *p == partition)
            .unwrap_or_default()]
    }

    /// Recover abandoned claims, then start every processor
    pub async fn init_all(&self) -> Result<()> {
        let running = self
            .processors
            .iter()
            .any(|p| p.status().state != ProcessorState::Stopped);
        if !running {
            self.ctx.queue.recover_claims().await?;
        }
        for processor in &self.processors {
            processor.init();
        }
        Ok(())
    }

    pub fn init(&self, partition: Partition) {
        self.processor(partition).init();
    }

    pub fn pause(&self, partition: Partition) {
        self.processor(partition).pause();
    }

    pub fn resume(&self, partition: Partition) {
        self.processor(partition).resume();
    }

    pub async fn stop(&self, partition: Partition) {
        self.processor(partition).stop().await;
    }

    /// Stop every processor; each finishes its in-flight command
    pub async fn stop_all(&self) {
        futures::future::join_all(self.processors.iter().map(|p| p.stop())).await;
    }

    /// Producer entry point
    pub async fn enqueue(
        &self,
        request: impl Into<CommandRequest>,
        priority: Option<Priority>,
    ) -> Result<EnqueueOutcome> {
        self.ctx.queue.enqueue(&request.into(), priority).await
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        let mut partitions = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            let partition = processor.partition();
            let stats = self.ctx.queue.stats(partition).await?;
            let status = processor.status();
            partitions.push(PartitionStatus {
                partition,
                state: status.state.to_string(),
                message: status.message,
                current: status.current,
                depth: stats.depth(),
                failed: stats.failed,
                paused: processor.is_paused(),
            });
        }

        let session = self.ctx.session.status();
        Ok(QueueStatus {
            partitions,
            logged_in: session.logged_in,
            banned: session.is_banned(),
            ban_time: session.ban_time,
            invalid_session: session.invalid_session,
        })
    }
}
