//! Error types for the failover control plane
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for failover operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the failover control plane
#[derive(Error, Debug)]
pub enum Error {
    /// Health/provider store errors (database layer)
    #[error("store error: {0}")]
    Store(String),

    /// Controller state persistence errors
    #[error("state file error: {0}")]
    StateFile(String),

    /// Registrar API errors
    #[error("registrar error ({registrar}): {message}")]
    Registrar {
        /// Registrar implementation name
        registrar: String,
        /// Error message
        message: String,
    },

    /// DNS probe / resolver errors
    #[error("dns error: {0}")]
    Dns(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a state file error
    pub fn state_file(msg: impl Into<String>) -> Self {
        Self::StateFile(msg.into())
    }

    /// Create a registrar error
    pub fn registrar(registrar: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registrar {
            registrar: registrar.into(),
            message: message.into(),
        }
    }

    /// Create a DNS error
    pub fn dns(msg: impl Into<String>) -> Self {
        Self::Dns(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
