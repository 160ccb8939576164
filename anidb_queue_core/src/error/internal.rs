//! Internal library error types

use thiserror::Error;

/// Internal library errors
#[derive(Error, Debug)]
pub enum InternalError {
    /// Persistence layer failure
    #[error("Database error: {message}")]
    Database { message: String },

    /// Command payload or entity could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A background task went away while a request was in flight
    #[error("{component} channel closed")]
    ChannelClosed { component: String },

    /// Hash calculation error
    #[error("Hash calculation failed for algorithm '{algorithm}': {message}")]
    HashCalculation { algorithm: String, message: String },

    /// Internal assertion failure
    #[error("Internal assertion failed: {message}")]
    Assertion { message: String },
}

impl InternalError {
    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a closed channel error
    pub fn channel_closed(component: &str) -> Self {
        Self::ChannelClosed {
            component: component.to_string(),
        }
    }

    /// Create a hash calculation error
    pub fn hash_calculation(algorithm: &str, message: &str) -> Self {
        Self::HashCalculation {
            algorithm: algorithm.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an internal assertion failure error
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Database { .. } | Self::ChannelClosed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error() {
        let error = InternalError::database("database is locked");
        assert!(error.to_string().contains("database is locked"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_serialization_error() {
        let error = InternalError::serialization("missing field `hash`");
        assert!(error.to_string().contains("Serialization error"));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_channel_closed_error() {
        let error = InternalError::channel_closed("session");
        assert_eq!(error.to_string(), "session channel closed");
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_hash_calculation_error() {
        let error = InternalError::hash_calculation("ED2K", "read failed");
        assert!(error.to_string().contains("ED2K"));
        assert!(error.to_string().contains("read failed"));
    }

    #[test]
    fn test_assertion_error() {
        let error = InternalError::assertion("Invariant violated");
        assert!(error.to_string().contains("Internal assertion failed"));
        assert!(!error.is_recoverable());
    }
}
