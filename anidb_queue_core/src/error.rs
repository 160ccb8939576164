//! Error types for the AniDB command queue
//!
//! Errors are grouped by where they originate. Every error can be reduced to a
//! [`FailureKind`], which is what the queue processors use to decide whether a
//! command is retried, parked, or dropped.

use thiserror::Error;

pub mod internal;
pub mod io;
pub mod protocol;
pub mod validation;

pub use self::io::{IoError, IoErrorKind};
pub use self::protocol::{BanSource, ProtocolError};
pub use self::validation::ValidationError;
pub use internal::InternalError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the AniDB command queue
///
/// Errors are categorized into four main types:
/// - I/O errors: file system operations of the hashing and image collaborators
/// - Protocol errors: AniDB UDP and HTTP outcomes (bans, invalid sessions, timeouts)
/// - Validation errors: credentials, configuration and command parameters
/// - Internal errors: persistence, serialization and actor plumbing
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error(transparent)]
    Io(#[from] IoError),

    /// Protocol related errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation related errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Internal library errors
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// How a failed command should be treated by its processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble; park the command for a later manual or automatic retry
    Transient,
    /// Server dropped the session; re-login and retry once
    InvalidSession,
    /// Account or client is banned; pause the partition
    Banned,
    /// Bad data or logic; drop the command
    Fatal,
}

impl Error {
    /// Classify this error for the queue retry policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Protocol(err) => err.failure_kind(),
            Self::Io(err) if err.kind == IoErrorKind::Other => FailureKind::Transient,
            Self::Internal(err) if err.is_recoverable() => FailureKind::Transient,
            _ => FailureKind::Fatal,
        }
    }

    /// Whether this is a ban, from either the UDP or the HTTP API
    pub fn is_banned(&self) -> bool {
        self.failure_kind() == FailureKind::Banned
    }
}

// Conversions from external error types

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(IoError::from_std(source))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(InternalError::serialization(err.to_string()))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(InternalError::database(err.to_string()))
    }
}

impl From<crate::protocol::error::ProtocolError> for Error {
    fn from(err: crate::protocol::error::ProtocolError) -> Self {
        use crate::protocol::error::ProtocolError as ProtoErr;

        match err {
            ProtoErr::Io(io_err) => Self::Protocol(ProtocolError::network(io_err.to_string())),
            ProtoErr::Timeout(duration) => Self::Protocol(ProtocolError::Timeout {
                seconds: duration.as_secs(),
            }),
            ProtoErr::Banned { reason } => Self::Protocol(ProtocolError::banned(BanSource::Udp, &reason)),
            ProtoErr::InvalidSession => Self::Protocol(ProtocolError::InvalidSession),
            ProtoErr::ServerError { code, message } => {
                Self::Protocol(ProtocolError::server_error(code, &message))
            }
            ProtoErr::MalformedResponse(message) | ProtoErr::InvalidPacket(message) => {
                Self::Protocol(ProtocolError::malformed(message))
            }
            _ => Self::Protocol(ProtocolError::other(format!("Protocol error: {err}"))),
        }
    }
}
