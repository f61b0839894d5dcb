//! Error code descriptions.
//!
//! Every error added to an [`ErrorCollection`](crate::ErrorCollection) is
//! identified by a dotted code such as `platform.not_found`. The
//! [`ErrorDescriptions`] registry maps each code to the HTTP status it
//! implies and the default human-readable message.
//!
//! Platform and generic codes are always present. Resource interfaces add
//! their own domain codes, for example `service_calls_a.triggered`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Well-known error codes.
pub mod codes {
    /// The target resource endpoint or instance was not found.
    pub const PLATFORM_NOT_FOUND: &str = "platform.not_found";
    /// The action is not supported by the addressed interface.
    pub const PLATFORM_METHOD_NOT_ALLOWED: &str = "platform.method_not_allowed";
    /// The request could not be interpreted.
    pub const PLATFORM_MALFORMED: &str = "platform.malformed";
    /// The session is missing, expired or outdated.
    pub const PLATFORM_INVALID_SESSION: &str = "platform.invalid_session";
    /// The session does not permit the action.
    pub const PLATFORM_FORBIDDEN: &str = "platform.forbidden";
    /// A downstream call exceeded its time budget.
    pub const PLATFORM_TIMEOUT: &str = "platform.timeout";
    /// Anything unexpected.
    pub const PLATFORM_FAULT: &str = "platform.fault";
    /// A resource instance was not found.
    pub const GENERIC_NOT_FOUND: &str = "generic.not_found";
    /// The payload failed validation.
    pub const GENERIC_MALFORMED: &str = "generic.malformed";
    /// The payload duplicates an existing instance.
    pub const GENERIC_INVALID_DUPLICATION: &str = "generic.invalid_duplication";
}

/// The status and default message for one error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    /// Dotted error code.
    pub code: String,
    /// HTTP status implied by the code.
    pub status: u16,
    /// Default message used when none is given.
    pub message: String,
}

/// Registry of known error codes.
///
/// # Example
///
/// ```
/// use iris_core::ErrorDescriptions;
///
/// let descriptions = ErrorDescriptions::new()
///     .with_domain_error("service_calls_a", "triggered", 412, "Triggered");
///
/// let triggered = descriptions.describe("service_calls_a.triggered").unwrap();
/// assert_eq!(triggered.status, 412);
/// assert_eq!(descriptions.describe("platform.timeout").unwrap().status, 408);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptions {
    entries: HashMap<String, ErrorDescription>,
}

impl ErrorDescriptions {
    /// Creates a registry holding the platform and generic codes.
    #[must_use]
    pub fn new() -> Self {
        let mut descriptions = Self {
            entries: HashMap::new(),
        };
        for (code, status, message) in [
            (codes::PLATFORM_NOT_FOUND, 404, "Not found"),
            (codes::PLATFORM_METHOD_NOT_ALLOWED, 405, "Method not allowed"),
            (codes::PLATFORM_MALFORMED, 422, "Malformed request"),
            (codes::PLATFORM_INVALID_SESSION, 401, "Invalid session"),
            (codes::PLATFORM_FORBIDDEN, 403, "Action not authorized"),
            (codes::PLATFORM_TIMEOUT, 408, "Request timeout"),
            (codes::PLATFORM_FAULT, 500, "Internal error"),
            (codes::GENERIC_NOT_FOUND, 404, "Resource not found"),
            (codes::GENERIC_MALFORMED, 422, "Malformed payload"),
            (codes::GENERIC_INVALID_DUPLICATION, 422, "Duplicates not allowed"),
        ] {
            descriptions.define(code, status, message);
        }
        descriptions
    }

    /// Returns a shared registry holding only the built-in codes.
    #[must_use]
    pub fn platform() -> Arc<Self> {
        static PLATFORM: OnceLock<Arc<ErrorDescriptions>> = OnceLock::new();
        Arc::clone(PLATFORM.get_or_init(|| Arc::new(Self::new())))
    }

    /// Defines (or redefines) an error code.
    pub fn define(
        &mut self,
        code: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> &mut Self {
        let code = code.into();
        self.entries.insert(
            code.clone(),
            ErrorDescription {
                code,
                status,
                message: message.into(),
            },
        );
        self
    }

    /// Adds a domain error `domain.name`.
    #[must_use]
    pub fn with_domain_error(
        mut self,
        domain: &str,
        name: &str,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        self.define(format!("{domain}.{name}"), status, message);
        self
    }

    /// Copies every code of `other` into this registry.
    pub fn merge(&mut self, other: &Self) {
        for (code, description) in &other.entries {
            self.entries.insert(code.clone(), description.clone());
        }
    }

    /// Looks up a code.
    #[must_use]
    pub fn describe(&self, code: &str) -> Option<&ErrorDescription> {
        self.entries.get(code)
    }

    /// Returns `true` if the code is known.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of known codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no codes are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorDescriptions {
    fn default() -> Self {
        Self::new()
    }
}
