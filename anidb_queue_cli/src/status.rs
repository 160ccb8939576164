//! Offline status report read straight from the queue database

use anidb_queue_core::queue::CommandStatus;
use anidb_queue_core::repositories::{ScheduleRepository, ScheduledUpdate};
use anidb_queue_core::{Database, Partition, PersistedQueue, Repositories};
use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Parked commands shown per partition
const FAILED_SHOWN: usize = 10;

/// How far each list is scanned for parked commands
const SCAN_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub partitions: Vec<PartitionReport>,
    pub schedule: Vec<ScheduleReport>,
    pub stored_entities: u64,
}

#[derive(Debug, Serialize)]
pub struct PartitionReport {
    pub partition: Partition,
    pub pending: u64,
    pub running: u64,
    pub failed: u64,
    pub next: Option<String>,
    pub failures: Vec<FailureReport>,
}

#[derive(Debug, Serialize)]
pub struct FailureReport {
    pub id: i64,
    pub command_key: String,
    pub error_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleReport {
    pub update: &'static str,
    pub last_run: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub async fn collect(database: &Database) -> Result<Self> {
        let queue = PersistedQueue::new(Arc::new(database.command_store()));
        let repos = Repositories::from_store(Arc::new(database.entity_store()));

        let mut partitions = Vec::with_capacity(Partition::ALL.len());
        for partition in Partition::ALL {
            let stats = queue.stats(partition).await?;
            let commands = queue.list(partition, SCAN_LIMIT).await?;
            let next = commands
                .iter()
                .find(|c| c.status == CommandStatus::Pending)
                .map(|c| c.command_key.clone());
            let failures = commands
                .into_iter()
                .filter(|c| c.status == CommandStatus::Failed)
                .take(FAILED_SHOWN)
                .map(|c| FailureReport {
                    id: c.id,
                    command_key: c.command_key,
                    error_count: c.error_count,
                    last_error: c.last_error,
                })
                .collect();
            partitions.push(PartitionReport {
                partition,
                pending: stats.pending,
                running: stats.claimed,
                failed: stats.failed,
                next,
                failures,
            });
        }

        let mut schedule = Vec::with_capacity(ScheduledUpdate::ALL.len());
        for update in ScheduledUpdate::ALL {
            schedule.push(ScheduleReport {
                update: update.as_str(),
                last_run: repos.schedule.last_run(update).await?,
            });
        }

        Ok(Self {
            partitions,
            schedule,
            stored_entities: database.stats().await?.entity_count,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "Queues".bold());
        for p in &self.partitions {
            let failed = if p.failed > 0 {
                p.failed.to_string().red().to_string()
            } else {
                "0".to_string()
            };
            let _ = writeln!(
                out,
                "  {:<8} pending {:>5}  running {:>2}  failed {:>5}",
                p.partition.as_str(),
                p.pending,
                p.running,
                failed
            );
            if let Some(next) = &p.next {
                let _ = writeln!(out, "           next: {}", next.cyan());
            }
            for failure in &p.failures {
                let _ = writeln!(
                    out,
                    "           {} #{} {} ({}x): {}",
                    "✗".red(),
                    failure.id,
                    failure.command_key,
                    failure.error_count,
                    failure.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Scheduled updates".bold());
        for entry in &self.schedule {
            let when = entry
                .last_run
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".dimmed().to_string());
            let _ = writeln!(out, "  {:<13} {when}", entry.update);
        }

        let _ = writeln!(out);
        let _ = write!(out, "Stored entities: {}", self.stored_entities);
        out
    }
}
