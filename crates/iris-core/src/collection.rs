//! Error collections.
//!
//! Expected errors never travel as Rust errors. They accumulate in an
//! [`ErrorCollection`] attached to a response or a call result, and are
//! rendered on the wire as an errors document:
//!
//! ```json
//! {
//!   "kind": "Errors",
//!   "interaction_id": "0190c5e1-...",
//!   "errors": [
//!     { "code": "service_calls_a.triggered", "message": "Triggered", "reference": "42" }
//!   ]
//! }
//! ```
//!
//! The HTTP status of a collection is the status of the first error added.

use crate::descriptions::{codes, ErrorDescriptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Value of the `kind` field of an errors document.
pub const ERRORS_KIND: &str = "Errors";

/// An ordered set of reference values attached to an error.
///
/// References render as their values joined by `,`. Commas inside values
/// are escaped as `\,`.
///
/// # Example
///
/// ```
/// use iris_core::Reference;
///
/// let reference = Reference::new().with("offset", 42);
/// assert_eq!(reference.render(), "42");
///
/// let reference = Reference::new().with("a", "x,y").with("b", "z");
/// assert_eq!(reference.render(), "x\\,y,z");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference(IndexMap<String, String>);

impl Reference {
    /// Creates an empty reference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyed value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns `true` if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the reference for the wire.
    #[must_use]
    pub fn render(&self) -> String {
        self.0
            .values()
            .map(|value| value.replace(',', "\\,"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    /// Dotted error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Rendered reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Accumulated errors for one response or call result.
///
/// # Example
///
/// ```
/// use iris_core::{ErrorCollection, Reference};
///
/// let mut errors = ErrorCollection::new();
/// assert!(!errors.has_errors());
///
/// errors.add_error("platform.forbidden", None);
/// errors.add_error("platform.not_found", Some(Reference::new().with("ident", "x")));
///
/// assert_eq!(errors.len(), 2);
/// assert_eq!(errors.http_status(), 403);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorCollection {
    errors: Vec<PlatformError>,
    http_status: u16,
    descriptions: Arc<ErrorDescriptions>,
}

impl ErrorCollection {
    /// Creates an empty collection using the built-in error codes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptions(ErrorDescriptions::platform())
    }

    /// Creates an empty collection resolving codes against `descriptions`.
    #[must_use]
    pub fn with_descriptions(descriptions: Arc<ErrorDescriptions>) -> Self {
        Self {
            errors: Vec::new(),
            http_status: 500,
            descriptions,
        }
    }

    /// Returns the descriptions this collection resolves codes against.
    #[must_use]
    pub fn descriptions(&self) -> &Arc<ErrorDescriptions> {
        &self.descriptions
    }

    /// Adds an error using the code's default message.
    ///
    /// Unknown codes are recorded with status 500 and the code as message.
    pub fn add_error(&mut self, code: &str, reference: Option<Reference>) -> &mut Self {
        let (status, message) = match self.descriptions.describe(code) {
            Some(description) => (description.status, description.message.clone()),
            None => {
                tracing::warn!(code = %code, "adding error with undescribed code");
                (500, code.to_string())
            }
        };
        self.push(status, code, message, reference);
        self
    }

    /// Adds an error with an explicit message.
    pub fn add_error_with_message(
        &mut self,
        code: &str,
        message: impl Into<String>,
        reference: Option<Reference>,
    ) -> &mut Self {
        let status = self
            .descriptions
            .describe(code)
            .map_or(500, |description| description.status);
        self.push(status, code, message.into(), reference);
        self
    }

    /// Adds an already-rendered error verbatim with an explicit status.
    ///
    /// Used when copying errors received from a downstream resource.
    pub fn add_precompiled_error(&mut self, error: PlatformError, status: u16) -> &mut Self {
        if self.errors.is_empty() {
            self.http_status = status;
        }
        self.errors.push(error);
        self
    }

    fn push(&mut self, status: u16, code: &str, message: String, reference: Option<Reference>) {
        if self.errors.is_empty() {
            self.http_status = status;
        }
        self.errors.push(PlatformError {
            code: code.to_string(),
            message,
            reference: reference
                .filter(|reference| !reference.is_empty())
                .map(|reference| reference.render()),
        });
    }

    /// Appends every error of `other`, keeping this collection's status if
    /// it already holds errors.
    pub fn merge(&mut self, other: &Self) {
        for error in &other.errors {
            self.add_precompiled_error(error.clone(), other.http_status);
        }
    }

    /// Returns `true` if any error has been added.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if there are no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The errors, in insertion order.
    #[must_use]
    pub fn errors(&self) -> &[PlatformError] {
        &self.errors
    }

    /// Iterates over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, PlatformError> {
        self.errors.iter()
    }

    /// Returns `true` if any error has the given code.
    #[must_use]
    pub fn contains_code(&self, code: &str) -> bool {
        self.errors.iter().any(|error| error.code == code)
    }

    /// Returns `true` if there are errors and every one has the given code.
    #[must_use]
    pub fn only_contains(&self, code: &str) -> bool {
        self.has_errors() && self.errors.iter().all(|error| error.code == code)
    }

    /// Returns `true` if the collection holds only duplication errors.
    ///
    /// A deja-vu request answered with only these is a confirmed repeat.
    #[must_use]
    pub fn is_deja_vu_confirmable(&self) -> bool {
        self.only_contains(codes::GENERIC_INVALID_DUPLICATION)
    }

    /// HTTP status implied by the first error, 500 when empty.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.http_status
    }

    /// Removes every error.
    pub fn clear(&mut self) {
        self.errors.clear();
        self.http_status = 500;
    }

    /// Renders an errors document.
    #[must_use]
    pub fn to_document(&self, interaction_id: Option<&str>) -> Value {
        let mut document = json!({
            "kind": ERRORS_KIND,
            "errors": self.errors,
        });
        if let (Some(id), Some(object)) = (interaction_id, document.as_object_mut()) {
            object.insert("interaction_id".to_string(), Value::from(id));
        }
        document
    }

    /// Returns `true` if `document` claims to be an errors document.
    #[must_use]
    pub fn is_document(document: &Value) -> bool {
        document.get("kind").and_then(Value::as_str) == Some(ERRORS_KIND)
    }

    /// Parses an errors document received with HTTP `status`.
    ///
    /// Returns `None` if `document` is not an errors document or an entry has
    /// no code. Entries without a message take the code's default message.
    /// Non-string references are kept in their JSON form.
    #[must_use]
    pub fn from_document(
        document: &Value,
        status: u16,
        descriptions: Arc<ErrorDescriptions>,
    ) -> Option<Self> {
        if !Self::is_document(document) {
            return None;
        }
        let entries = document.get("errors")?.as_array()?;

        let mut collection = Self::with_descriptions(descriptions);
        for entry in entries {
            let code = entry.get("code").and_then(Value::as_str)?;
            let message = entry
                .get("message")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or_else(|| {
                    collection
                        .descriptions
                        .describe(code)
                        .map(|description| description.message.clone())
                })
                .unwrap_or_else(|| code.to_string());
            let reference = match entry.get("reference") {
                None | Some(Value::Null) => None,
                Some(Value::String(reference)) => Some(reference.clone()),
                Some(other) => Some(other.to_string()),
            };
            collection.add_precompiled_error(
                PlatformError {
                    code: code.to_string(),
                    message,
                    reference,
                },
                status,
            );
        }
        Some(collection)
    }
}

impl Default for ErrorCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ErrorCollection {
    fn eq(&self, other: &Self) -> bool {
        self.errors == other.errors
            && (self.errors.is_empty() || self.http_status == other.http_status)
    }
}

impl<'a> IntoIterator for &'a ErrorCollection {
    type Item = &'a PlatformError;
    type IntoIter = std::slice::Iter<'a, PlatformError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
