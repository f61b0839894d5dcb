//! Error types for the service registry.

use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry could not be reached before the connect deadline.
    #[error("Registry unavailable at {addr}: {message}")]
    Unavailable {
        /// Registry address.
        addr: String,
        /// Last failure seen.
        message: String,
    },

    /// An RPC was answered with an unexpected status or payload.
    #[error("Registry RPC failed: {message}")]
    Rpc {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Registry server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request client error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl RegistryError {
    /// Create an unavailable error.
    pub fn unavailable(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            addr: addr.into(),
            message: message.into(),
        }
    }

    /// Create an RPC error.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the registry could not be reached
    /// at all, as opposed to answering badly.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Io(_) => true,
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
