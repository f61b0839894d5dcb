//! Fatal error types for Iris.
//!
//! Expected, domain-level failures (not found, forbidden, timeouts,
//! validation) are accumulated in an [`ErrorCollection`] and returned as
//! data. [`IrisError`] is reserved for faults that must abort the whole
//! inbound request: broken configuration and errors raised by a resource
//! implementation running in-process.
//!
//! Every `IrisError` renders to the client as a 500 `platform.fault`.

use crate::collection::{ErrorCollection, Reference};
use crate::descriptions::codes;
use http::StatusCode;
use thiserror::Error;

/// Result type alias using [`IrisError`].
pub type IrisResult<T> = Result<T, IrisError>;

/// Fatal error raised through the inter-resource call stack.
///
/// # Example
///
/// ```
/// use iris_core::IrisError;
///
/// let err = IrisError::configuration("queue route selected but no queue binding present");
/// assert_eq!(err.status_code().as_u16(), 500);
/// assert_eq!(err.category(), "configuration");
/// ```
#[derive(Error, Debug)]
pub enum IrisError {
    /// Deployment or wiring is broken (for example a queue route with no
    /// queue binding).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// A resource implementation returned an error.
    #[error("Implementation error: {message}")]
    Implementation {
        /// Which implementation failed.
        message: String,
        /// The error returned by the implementation.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The service registry could not be reached when it was required.
    #[error("Registry error: {message}")]
    Registry {
        /// Human-readable error message.
        message: String,
    },

    /// Anything else.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl IrisError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an implementation error wrapping the implementation's error.
    pub fn implementation(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Implementation {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a registry error.
    #[must_use]
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns a short machine-readable category.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Implementation { .. } => "implementation",
            Self::Registry { .. } => "registry",
            Self::Internal { .. } => "internal",
        }
    }

    /// Returns the HTTP status code for this error. Always 500.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Converts this error to the `platform.fault` collection sent to
    /// clients.
    #[must_use]
    pub fn to_error_collection(&self) -> ErrorCollection {
        let mut errors = ErrorCollection::new();
        errors.add_error(
            codes::PLATFORM_FAULT,
            Some(Reference::new().with("exception", self.category())),
        );
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = IrisError::configuration("missing queue binding");
        assert_eq!(err.to_string(), "Configuration error: missing queue binding");

        let err = IrisError::implementation("show on widgets", anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "Implementation error: show on widgets");
    }

    #[test]
    fn test_source_is_kept() {
        let err = IrisError::implementation("list", anyhow::anyhow!("database gone"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "database gone");
    }

    #[test]
    fn test_collection_is_fault() {
        let errors = IrisError::registry("unreachable").to_error_collection();
        assert_eq!(errors.http_status(), 500);
        assert_eq!(errors.errors()[0].code, codes::PLATFORM_FAULT);
        assert_eq!(errors.errors()[0].reference.as_deref(), Some("registry"));
    }
}
