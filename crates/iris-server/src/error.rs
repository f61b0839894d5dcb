//! Server errors.

use iris_registry::RegistryError;
use thiserror::Error;

/// Errors raised while starting or running a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address could not be parsed.
    #[error("Invalid address '{addr}': {message}")]
    InvalidAddress {
        /// Address as configured.
        addr: String,
        /// Parse failure.
        message: String,
    },

    /// Failed to bind to the configured address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// Address being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Hosted interfaces could not be announced to the registry.
    #[error("Failed to announce interfaces: {0}")]
    Announce(#[from] RegistryError),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Create an invalid address error.
    pub fn invalid_address(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let error = ServerError::invalid_address("nope", "invalid socket address syntax");
        assert_eq!(
            error.to_string(),
            "Invalid address 'nope': invalid socket address syntax"
        );

        let error = ServerError::from(RegistryError::rpc("status 500"));
        assert!(error.to_string().starts_with("Failed to announce interfaces"));
    }
}
