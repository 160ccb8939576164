//! AniDB command queue core library
//!
//! A persisted, priority-ordered job queue in front of a rate-limited AniDB
//! session. Producers enqueue [`CommandRequest`]s; three [`QueueProcessor`]s
//! (general, hasher, images) drain them; every AniDB exchange goes through one
//! [`SessionClient`] actor that owns the socket, the login state and the rate
//! gate.

pub mod commands;
pub mod config;
pub mod credentials;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod hasher;
pub mod http;
pub mod images;
pub mod processor;
pub mod protocol;
pub mod queue;
pub mod repositories;
pub mod service;
pub mod session;

pub use commands::{CommandContext, CommandRequest, QueueCommand};
pub use config::QueueClientConfig;
pub use credentials::{LoginTarget, SecureString};
#[cfg(feature = "database")]
pub use database::{Database, DatabaseStats};
pub use error::{Error, FailureKind, Result};
pub use processor::{
    CommandQueues, PartitionStatus, ProcessorState, ProcessorStatus, QueueProcessor, QueueStatus,
};
pub use queue::{EnqueueOutcome, Partition, PersistedQueue, Priority};
pub use repositories::Repositories;
pub use service::QueueService;
pub use session::{SessionClient, SessionClientBuilder, SessionStatus};
