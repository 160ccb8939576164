//! Queue processors
//!
//! One [`QueueProcessor`] per [`Partition`] drains its lane of the
//! [`PersistedQueue`](crate::queue::PersistedQueue): claim the most urgent
//! command, run it, apply the failure policy, repeat. Workers sleep on the
//! lane's [`Notify`](tokio::sync::Notify) between commands and fall back to a
//! poll interval so a missed wake-up only costs latency.
//!
//! ```text
//! Stopped --init--> Running <--pause/resume--> Paused
//!                      |                          |
//!                      +----------stop------------+--> Stopping --> Stopped
//! ```

pub mod queues;

use crate::commands::{CommandContext, CommandRequest, HTTP_COMMAND_TYPES, UDP_COMMAND_TYPES};
use crate::error::{Error, FailureKind, Result};
use crate::queue::{ClaimFilter, Partition, StoredCommand};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use queues::{CommandQueues, PartitionStatus, QueueStatus};

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Stopped,
    Running,
    Paused,
    /// Stop requested; the in-flight command is finishing
    Stopping,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessorState::Stopped => "stopped",
            ProcessorState::Running => "running",
            ProcessorState::Paused => "paused",
            ProcessorState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// What a processor is doing right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorStatus {
    pub state: ProcessorState,
    pub message: String,
    /// Type of the command being executed
    pub current: Option<String>,
}

impl ProcessorStatus {
    fn stopped() -> Self {
        Self {
            state: ProcessorState::Stopped,
            message: "Stopped".to_string(),
            current: None,
        }
    }
}

/// Worker for one partition
pub struct QueueProcessor {
    partition: Partition,
    ctx: CommandContext,
    stop_requested: Arc<AtomicBool>,
    status: Arc<watch::Sender<ProcessorStatus>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProcessor {
    pub fn new(partition: Partition, ctx: CommandContext) -> Self {
        let (status, _) = watch::channel(ProcessorStatus::stopped());
        Self {
            partition,
            ctx,
            stop_requested: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
            handle: Mutex::new(None),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    fn handle(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the worker; a no-op when it is already running
    pub fn init(&self) {
        let mut handle = self.handle();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Processor {} already running", self.partition);
            return;
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let worker = Worker {
            partition: self.partition,
            ctx: self.ctx.clone(),
            stop_requested: self.stop_requested.clone(),
            status: self.status.clone(),
            acknowledged_ban: None,
        };
        worker.publish(ProcessorState::Running, "Starting", None);
        *handle = Some(tokio::spawn(worker.run()));
        info!("Processor {} started", self.partition);
    }

    /// Stop claiming work; the in-flight command still finishes
    pub fn pause(&self) {
        self.ctx.queue.pause(self.partition);
        self.status.send_modify(|status| {
            if status.state == ProcessorState::Running {
                status.state = ProcessorState::Paused;
                status.message = "Paused".to_string();
            }
        });
    }

    pub fn resume(&self) {
        self.ctx.queue.resume(self.partition);
        self.status.send_modify(|status| {
            if status.state == ProcessorState::Paused {
                status.state = ProcessorState::Running;
                status.message = "Resumed".to_string();
            }
        });
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.queue.is_paused(self.partition)
    }

    /// Request a stop and wait for the in-flight command to finish
    pub async fn stop(&self) {
        let Some(handle) = self.handle().take() else {
            return;
        };
        self.stop_requested.store(true, Ordering::SeqCst);
        self.status.send_modify(|status| {
            if status.state != ProcessorState::Stopped {
                status.state = ProcessorState::Stopping;
                status.message = "Stopping".to_string();
            }
        });
        self.ctx.queue.notify(self.partition);

        if let Err(e) = handle.await {
            error!("Processor {} worker ended abnormally: {e}", self.partition);
        }
        self.status.send_replace(ProcessorStatus::stopped());
        info!("Processor {} stopped", self.partition);
    }

    pub fn status(&self) -> ProcessorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessorStatus> {
        self.status.subscribe()
    }
}

struct Worker {
    partition: Partition,
    ctx: CommandContext,
    stop_requested: Arc<AtomicBool>,
    status: Arc<watch::Sender<ProcessorStatus>>,
    /// Ban already reacted to; a manual resume is not undone by the same ban
    acknowledged_ban: Option<DateTime<Utc>>,
}

impl Worker {
    fn publish(&self, state: ProcessorState, message: impl Into<String>, current: Option<String>) {
        let next = ProcessorStatus {
            state,
            message: message.into(),
            current,
        };
        self.status.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
    }

    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    async fn run(mut self) {
        let notify = self.ctx.queue.notifier(self.partition);
        let poll = self.ctx.config.queue.poll_interval();

        while !self.stopping() {
            let filter = if self.partition == Partition::General {
                self.react_to_ban().await
            } else {
                ClaimFilter::none()
            };

            if self.ctx.queue.is_paused(self.partition) {
                self.publish(ProcessorState::Paused, "Paused", None);
                let _ = tokio::time::timeout(poll, notify.notified()).await;
                continue;
            }

            match self.ctx.queue.claim_next(self.partition, &filter).await {
                Ok(Some(command)) => self.process(command).await,
                Ok(None) => {
                    self.publish(ProcessorState::Running, "Idle", None);
                    let _ = tokio::time::timeout(poll, notify.notified()).await;
                }
                Err(e) => {
                    error!("Processor {} could not claim work: {e}", self.partition);
                    self.publish(ProcessorState::Running, format!("Queue error: {e}"), None);
                    let _ = tokio::time::timeout(poll, notify.notified()).await;
                }
            }
        }
        debug!("Processor {} worker exiting", self.partition);
    }

    /// Pause on a new ban and keep banned channels out of the claim
    async fn react_to_ban(&mut self) -> ClaimFilter {
        let session = self.ctx.session.status();
        if !session.is_banned() {
            self.acknowledged_ban = None;
            return ClaimFilter::none();
        }

        if session.ban_time != self.acknowledged_ban {
            self.acknowledged_ban = session.ban_time;
            warn!(
                "AniDB ban detected (udp={}, http={}); pausing {}",
                session.udp_banned, session.http_banned, self.partition
            );
            self.ctx.queue.pause(self.partition);
            self.mark_network_unavailable().await;
        }

        let mut excluded: Vec<&'static str> = Vec::new();
        if session.udp_banned {
            excluded.extend(UDP_COMMAND_TYPES);
        }
        if session.http_banned {
            excluded.extend(HTTP_COMMAND_TYPES);
        }
        ClaimFilter::excluding(excluded)
    }

    async fn mark_network_unavailable(&self) {
        if let Err(e) = self.ctx.session.set_network_available(false).await {
            debug!("Could not flag network unavailable: {e}");
        }
    }

    async fn process(&mut self, command: StoredCommand) {
        let request = match CommandRequest::from_payload(&command.payload) {
            Ok(request) => request,
            Err(e) => {
                error!("Command #{} has an unreadable payload: {e}", command.id);
                self.record_failure(&command, &e).await;
                return;
            }
        };

        self.publish(
            ProcessorState::Running,
            format!("Processing {}", command.command_key),
            Some(command.command_type.clone()),
        );
        debug!("Executing {} (priority {})", command.command_key, command.priority);

        let mut result = request.execute(&self.ctx).await;
        if let Err(e) = &result
            && e.failure_kind() == FailureKind::InvalidSession
        {
            // The session actor logs in again on the next request
            warn!("{} hit an invalid session; retrying once", command.command_key);
            result = request.execute(&self.ctx).await;
        }

        match result {
            Ok(()) => {
                if let Err(e) = self.ctx.queue.complete(&command).await {
                    error!("Could not remove finished {}: {e}", command.command_key);
                }
            }
            Err(e) => {
                error!("{} failed: {e}", command.command_key);
                self.record_failure(&command, &e).await;
            }
        }
    }

    async fn record_failure(&mut self, command: &StoredCommand, error: &Error) {
        let kind = match self.ctx.queue.fail(command, error).await {
            Ok(kind) => kind,
            Err(e) => {
                error!("Could not record failure of {}: {e}", command.command_key);
                error.failure_kind()
            }
        };
        if kind == FailureKind::Banned {
            self.ctx.queue.pause(self.partition);
            self.publish(ProcessorState::Paused, format!("Banned: {error}"), None);
            if self.partition == Partition::General {
                self.acknowledged_ban = self.ctx.session.status().ban_time;
                self.mark_network_unavailable().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(ProcessorState::Running.to_string(), "running");
        assert_eq!(ProcessorState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_initial_status_is_stopped() {
        let status = ProcessorStatus::stopped();
        assert_eq!(status.state, ProcessorState::Stopped);
        assert!(status.current.is_none());
    }
}
