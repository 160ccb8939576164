//! Protocol-specific error types
//!
//! Errors raised while exchanging a single datagram with the AniDB UDP API.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-specific error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No datagram arrived in time
    #[error("Receive timeout after {0:?}")]
    Timeout(Duration),

    /// Invalid packet format
    #[error("Invalid packet format: {0}")]
    InvalidPacket(String),

    /// Packet too large
    #[error("Packet size {size} exceeds maximum {max_size}")]
    PacketTooLarge { size: usize, max_size: usize },

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Response could not be parsed
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// AniDB server error
    #[error("AniDB server error: {code} - {message}")]
    ServerError { code: u16, message: String },

    /// Server reports 501 LOGIN FIRST or 506 INVALID SESSION
    #[error("Session rejected by server")]
    InvalidSession,

    /// Server reports 555 BANNED
    #[error("Banned: {reason}")]
    Banned { reason: String },
}

impl ProtocolError {
    /// Create an invalid packet error
    pub fn invalid_packet(message: impl Into<String>) -> Self {
        Self::InvalidPacket(message.into())
    }

    /// Create a packet too large error
    pub fn packet_too_large(size: usize, max_size: usize) -> Self {
        Self::PacketTooLarge { size, max_size }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Create a server error
    pub fn server_error(code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Create a ban error
    pub fn banned(reason: impl Into<String>) -> Self {
        Self::Banned {
            reason: reason.into(),
        }
    }

    /// Map an error response code to an error, or `None` when the code is not an error
    pub fn from_code(code: u16, message: &str) -> Option<Self> {
        match code {
            501 | 506 => Some(Self::InvalidSession),
            555 => Some(Self::banned(message)),
            500..=699 => Some(Self::server_error(code, message)),
            _ => None,
        }
    }

    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Timeout(_)
                | Self::ServerError {
                    code: 600..=604,
                    ..
                }
        )
    }
}

/// Response code returned by AniDB server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    /// Check if the response code indicates success
    pub fn is_success(&self) -> bool {
        matches!(self.0, 200..=299)
    }

    /// Negative but well-formed answers such as "no such file"
    pub fn is_no_data(&self) -> bool {
        matches!(self.0, 301..=399 if self.0 != 310 && self.0 != 311) || self.0 == 411
    }

    /// Check if the response code indicates an error
    pub fn is_error(&self) -> bool {
        self.0 >= 500
    }

    /// Get a human-readable description of the response code
    pub fn description(&self) -> &'static str {
        match self.0 {
            200 => "LOGIN ACCEPTED",
            201 => "LOGIN ACCEPTED - NEW VERSION AVAILABLE",
            203 => "LOGGED OUT",
            210 => "MYLIST ENTRY ADDED",
            211 => "MYLIST ENTRY DELETED",
            220 => "FILE",
            221 => "MYLIST",
            222 => "MYLIST STATS",
            225 => "GROUP STATUS",
            230 => "ANIME",
            234 => "REVIEW",
            235 => "CHARACTER",
            240 => "EPISODE",
            243 => "UPDATED",
            250 => "GROUP",
            260 => "VOTED",
            261 => "VOTE FOUND",
            262 => "VOTE UPDATED",
            263 => "VOTE REVOKED",
            297 => "CALENDAR",

            300 => "PONG",
            310 => "FILE ALREADY IN MYLIST",
            311 => "MYLIST ENTRY EDITED",
            320 => "NO SUCH FILE",
            321 => "NO SUCH ENTRY",
            325 => "NO GROUPS FOUND",
            330 => "NO SUCH ANIME",
            334 => "NO SUCH REVIEW",
            335 => "NO SUCH CHARACTER",
            340 => "NO SUCH EPISODE",
            343 => "NO UPDATES",
            350 => "NO SUCH GROUP",
            360 => "NO SUCH VOTE",
            361 => "INVALID VOTE TYPE",
            362 => "INVALID VOTE VALUE",
            363 => "PERMVOTE NOT ALLOWED",
            397 => "CALENDAR EMPTY",

            403 => "NOT LOGGED IN",
            411 => "NO SUCH MYLIST ENTRY",

            500 => "LOGIN FAILED",
            501 => "LOGIN FIRST",
            502 => "ACCESS DENIED",
            503 => "CLIENT VERSION OUTDATED",
            504 => "CLIENT BANNED",
            505 => "ILLEGAL INPUT OR ACCESS DENIED",
            506 => "INVALID SESSION",
            555 => "BANNED",
            598 => "UNKNOWN COMMAND",
            600 => "INTERNAL SERVER ERROR",
            601 => "ANIDB OUT OF SERVICE",
            602 => "SERVER BUSY",
            604 => "TIMEOUT - DELAY AND RESUBMIT",

            _ => "UNKNOWN RESPONSE CODE",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let errors = vec![
            ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout")),
            ProtocolError::Timeout(Duration::from_secs(30)),
            ProtocolError::server_error(602, "SERVER BUSY"),
        ];

        for err in errors {
            assert!(err.is_transient(), "{err:?} should be transient");
        }
    }

    #[test]
    fn test_non_transient_errors() {
        let errors = vec![
            ProtocolError::invalid_packet("bad"),
            ProtocolError::banned("LEECH"),
            ProtocolError::server_error(598, "UNKNOWN COMMAND"),
        ];

        for err in errors {
            assert!(!err.is_transient(), "{err:?} should not be transient");
        }
    }

    #[test]
    fn test_from_code() {
        assert!(matches!(
            ProtocolError::from_code(501, "LOGIN FIRST"),
            Some(ProtocolError::InvalidSession)
        ));
        assert!(matches!(
            ProtocolError::from_code(506, "INVALID SESSION"),
            Some(ProtocolError::InvalidSession)
        ));
        assert!(matches!(
            ProtocolError::from_code(555, "BANNED"),
            Some(ProtocolError::Banned { .. })
        ));
        assert!(matches!(
            ProtocolError::from_code(601, "ANIDB OUT OF SERVICE"),
            Some(ProtocolError::ServerError { code: 601, .. })
        ));
        assert!(ProtocolError::from_code(320, "NO SUCH FILE").is_none());
        assert!(ProtocolError::from_code(220, "FILE").is_none());
    }

    #[test]
    fn test_response_code_classes() {
        assert!(ResponseCode(220).is_success());
        assert!(ResponseCode(320).is_no_data());
        assert!(ResponseCode(411).is_no_data());
        assert!(!ResponseCode(310).is_no_data());
        assert!(!ResponseCode(311).is_no_data());
        assert!(!ResponseCode(300).is_no_data());
        assert!(ResponseCode(555).is_error());

        assert_eq!(ResponseCode(555).description(), "BANNED");
        assert_eq!(ResponseCode(999).description(), "UNKNOWN RESPONSE CODE");
    }

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode(203).to_string(), "203 LOGGED OUT");
    }
}
