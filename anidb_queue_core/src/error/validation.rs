//! Validation related error types

use thiserror::Error;

/// Validation and configuration errors
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Credentials needed for login are absent
    #[error("Missing AniDB credential: {field}")]
    MissingCredentials { field: String },

    /// Invalid input parameter
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Command type that the catalog does not know
    #[error("Unknown command type: {command_type}")]
    UnknownCommand { command_type: String },
}

impl ValidationError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(message: &str) -> Self {
        Self::InvalidConfiguration {
            message: message.to_string(),
        }
    }

    /// Create a missing credentials error
    pub fn missing_credentials(field: &str) -> Self {
        Self::MissingCredentials {
            field: field.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, reason: &str) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    /// Create an unknown command error
    pub fn unknown_command(command_type: &str) -> Self {
        Self::UnknownCommand {
            command_type: command_type.to_string(),
        }
    }
}
