//! Error types and handling for Auriga
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Auriga operations
pub type Result<T> = std::result::Result<T, AurigaError>;

/// Main error type for Auriga
#[derive(Debug, Error)]
pub enum AurigaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// CAN bus communication errors
    #[error("CAN error: {message}")]
    Can { message: String },

    /// Actuator (motor controller) errors
    #[error("Actuator error: {message}")]
    Actuator { message: String },

    /// Battery engine errors
    #[error("Battery error: {message}")]
    Battery { message: String },

    /// Charging engine errors
    #[error("Charging error: {message}")]
    Charging { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AurigaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AurigaError::Config {
            message: message.into(),
        }
    }

    /// Create a new CAN error
    pub fn can<S: Into<String>>(message: S) -> Self {
        AurigaError::Can {
            message: message.into(),
        }
    }

    /// Create a new actuator error
    pub fn actuator<S: Into<String>>(message: S) -> Self {
        AurigaError::Actuator {
            message: message.into(),
        }
    }

    /// Create a new battery error
    pub fn battery<S: Into<String>>(message: S) -> Self {
        AurigaError::Battery {
            message: message.into(),
        }
    }

    /// Create a new charging error
    pub fn charging<S: Into<String>>(message: S) -> Self {
        AurigaError::Charging {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AurigaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AurigaError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AurigaError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AurigaError {
    fn from(err: std::io::Error) -> Self {
        AurigaError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AurigaError {
    fn from(err: serde_yaml::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AurigaError {
    fn from(err: serde_json::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}
