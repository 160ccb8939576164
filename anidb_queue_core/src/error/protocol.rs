//! Remote service error types
//!
//! These are the outcomes of AniDB exchanges after the wire layer has decoded
//! them, independent of whether they came over UDP or HTTP.

use crate::error::FailureKind;
use thiserror::Error;

/// Which AniDB API issued a ban
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanSource {
    Udp,
    Http,
}

impl std::fmt::Display for BanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "UDP"),
            Self::Http => write!(f, "HTTP"),
        }
    }
}

/// Protocol-related errors for AniDB communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network is offline or AniDB service unavailable
    #[error("Network is offline or AniDB service unavailable: {message}")]
    NetworkOffline { message: String },

    /// No reply arrived within the receive window
    #[error("No response from AniDB within {seconds}s")]
    Timeout { seconds: u64 },

    /// AniDB banned this account or client
    #[error("Banned by the AniDB {source_api} API: {reason}")]
    Banned { source_api: BanSource, reason: String },

    /// The session token was rejected by the server
    #[error("AniDB session is invalid")]
    InvalidSession,

    /// AniDB rejected the login
    #[error("AniDB login refused: {code} - {message}")]
    LoginRefused { code: u16, message: String },

    /// An operation needed a session but none is available
    #[error("Not logged in to AniDB")]
    NotLoggedIn,

    /// AniDB API error with response code
    #[error("AniDB API error: {code} - {message}")]
    ServerError { code: u16, message: String },

    /// The server replied with something that could not be understood
    #[error("Malformed AniDB response: {message}")]
    MalformedResponse { message: String },

    /// Generic protocol error
    #[error("Protocol error: {message}")]
    Other { message: String },
}

impl ProtocolError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkOffline {
            message: message.into(),
        }
    }

    /// Create a ban error
    pub fn banned(source_api: BanSource, reason: &str) -> Self {
        Self::Banned {
            source_api,
            reason: reason.to_string(),
        }
    }

    /// Create a server error with code and message
    pub fn server_error(code: u16, message: &str) -> Self {
        Self::ServerError {
            code,
            message: message.to_string(),
        }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a generic protocol error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkOffline { .. } | Self::Timeout { .. } => true,
            Self::ServerError { code, .. } => matches!(code, 600..=604),
            _ => false,
        }
    }

    /// Classify for the queue retry policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Banned { .. } => FailureKind::Banned,
            Self::InvalidSession | Self::NotLoggedIn => FailureKind::InvalidSession,
            Self::ServerError { code: 501 | 506, .. } => FailureKind::InvalidSession,
            Self::ServerError { code: 555, .. } => FailureKind::Banned,
            Self::LoginRefused { .. } => FailureKind::Transient,
            _ if self.is_transient() => FailureKind::Transient,
            _ => FailureKind::Fatal,
        }
    }
}

impl From<quick_xml::DeError> for ProtocolError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::malformed(format!("invalid XML document: {e}"))
    }
}
