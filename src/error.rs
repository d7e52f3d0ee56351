//! Error types and handling for EVLink
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for EVLink operations
pub type Result<T> = std::result::Result<T, EvlinkError>;

/// Main error type for EVLink
#[derive(Debug, Error)]
pub enum EvlinkError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// EVLink backend errors
    #[error("API error: {message}")]
    Api { message: String },

    /// Backend rate limit hit; the caller should skip this cycle and keep its data
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Entry activation and setup wizard errors
    #[error("Setup error: {message}")]
    Setup { message: String },
}

impl EvlinkError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EvlinkError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        EvlinkError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        EvlinkError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        EvlinkError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        EvlinkError::Api {
            message: message.into(),
        }
    }

    /// Create a new rate-limit error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        EvlinkError::RateLimited {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        EvlinkError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new setup error
    pub fn setup<S: Into<String>>(message: S) -> Self {
        EvlinkError::Setup {
            message: message.into(),
        }
    }

    /// Whether the failure only means "try again next cycle"
    pub fn is_retryable(&self) -> bool {
        matches!(self, EvlinkError::RateLimited { .. })
    }
}

impl From<std::io::Error> for EvlinkError {
    fn from(err: std::io::Error) -> Self {
        EvlinkError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvlinkError {
    fn from(err: serde_yaml::Error) -> Self {
        EvlinkError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EvlinkError {
    fn from(err: serde_json::Error) -> Self {
        EvlinkError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EvlinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EvlinkError::timeout(err.to_string())
        } else {
            EvlinkError::network(err.to_string())
        }
    }
}
