//! Result normalization.
//!
//! Turns whatever a transport delivered into a [`CallResult`]. Normalizing
//! is pure: the same outcome always gives the same result.

use std::sync::Arc;

use iris_core::{
    codes, CallResult, CollectionResult, ErrorCollection, ErrorDescriptions, Reference,
    ResourceResult, Target,
};
use serde_json::{Map, Value};

use crate::headers::is_deja_vu_confirmed;
use crate::transport::{RawResponse, TransportFailure, TransportOutcome};

/// Builds [`CallResult`]s from transport outcomes.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use http::HeaderMap;
/// use iris_core::{Action, Target};
/// use iris_middleware::{RawResponse, ResultNormalizer, TransportOutcome};
///
/// let normalizer = ResultNormalizer::new();
/// let outcome = TransportOutcome::Delivered(RawResponse {
///     status: 200,
///     headers: HeaderMap::new(),
///     body: Bytes::from_static(br#"{"name":"x"}"#),
/// });
///
/// let result = normalizer.normalize(&outcome, &Target::new("Widget", 1, Action::Show), false);
/// assert!(!result.has_errors());
/// assert_eq!(result.as_resource().unwrap().get("name").unwrap(), "x");
/// ```
#[derive(Debug, Clone)]
pub struct ResultNormalizer {
    descriptions: Arc<ErrorDescriptions>,
}

impl Default for ResultNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultNormalizer {
    /// Creates a normalizer that knows only the built-in error codes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptions(ErrorDescriptions::platform())
    }

    /// Creates a normalizer resolving codes against `descriptions`.
    #[must_use]
    pub fn with_descriptions(descriptions: Arc<ErrorDescriptions>) -> Self {
        Self { descriptions }
    }

    /// Normalizes the outcome of calling `target`.
    #[must_use]
    pub fn normalize(&self, outcome: &TransportOutcome, target: &Target, deja_vu: bool) -> CallResult {
        match outcome {
            TransportOutcome::Delivered(raw) => self.normalize_response(raw, target, deja_vu),
            TransportOutcome::Failed(TransportFailure::Unreachable(_)) => {
                self.failure(target, codes::PLATFORM_NOT_FOUND, Some(endpoint_reference(target)))
            }
            TransportOutcome::Failed(TransportFailure::TimedOut) => {
                self.failure(target, codes::PLATFORM_TIMEOUT, None)
            }
            TransportOutcome::Failed(TransportFailure::Other(message)) => self.failure(
                target,
                codes::PLATFORM_FAULT,
                Some(Reference::new().with("message", message)),
            ),
        }
    }

    fn normalize_response(&self, raw: &RawResponse, target: &Target, deja_vu: bool) -> CallResult {
        let document = if raw.body.is_empty() {
            None
        } else {
            serde_json::from_slice::<Value>(&raw.body).ok()
        };

        let Some(document) = document else {
            return self.classify(raw, target, deja_vu);
        };

        if ErrorCollection::is_document(&document) {
            return match ErrorCollection::from_document(
                &document,
                raw.status,
                Arc::clone(&self.descriptions),
            ) {
                Some(errors) if errors.has_errors() => CallResult::empty_for(target.action, errors),
                _ => self.failure(
                    target,
                    codes::PLATFORM_FAULT,
                    Some(Reference::new().with(
                        "message",
                        format!(
                            "Malformed errors document returned for {} on {} with HTTP status code {}",
                            target.action, target.resource, raw.status
                        ),
                    )),
                ),
            };
        }

        if !(200..300).contains(&raw.status) {
            return self.classify(raw, target, deja_vu);
        }

        match document {
            Value::Object(mut fields) if fields.contains_key("_data") => {
                match fields.remove("_data") {
                    Some(Value::Array(items)) => CallResult::Collection(CollectionResult {
                        items,
                        dataset_size: fields.get("_dataset_size").and_then(Value::as_u64),
                        estimated_dataset_size: fields
                            .get("_estimated_dataset_size")
                            .and_then(Value::as_u64),
                        errors: self.errors(),
                    }),
                    other => self.unexpected_json(other.as_ref().unwrap_or(&Value::Null), target),
                }
            }
            Value::Object(fields) => CallResult::Resource(ResourceResult {
                fields,
                errors: self.errors(),
            }),
            Value::Array(items) => CallResult::Collection(CollectionResult {
                dataset_size: Some(items.len() as u64),
                items,
                estimated_dataset_size: None,
                errors: self.errors(),
            }),
            other => self.unexpected_json(&other, target),
        }
    }

    /// Classifies a response that carried no usable JSON.
    fn classify(&self, raw: &RawResponse, target: &Target, deja_vu: bool) -> CallResult {
        match raw.status {
            204 if deja_vu && is_deja_vu_confirmed(&raw.headers) => {
                CallResult::empty_for(target.action, self.errors())
            }
            204 => self.failure(
                target,
                codes::PLATFORM_FAULT,
                Some(Reference::new().with("status", 204)),
            ),
            200 => self.failure(
                target,
                codes::PLATFORM_FAULT,
                Some(Reference::new().with(
                    "message",
                    "Could not parse body data returned from inter-resource call despite receiving HTTP status code 200",
                )),
            ),
            404 => self.failure(target, codes::PLATFORM_NOT_FOUND, Some(endpoint_reference(target))),
            408 => self.failure(target, codes::PLATFORM_TIMEOUT, None),
            status => self.failure(
                target,
                codes::PLATFORM_FAULT,
                Some(Reference::new().with(
                    "message",
                    format!("Unexpected raw HTTP status code {status} during inter-resource call"),
                )),
            ),
        }
    }

    fn unexpected_json(&self, value: &Value, target: &Target) -> CallResult {
        let kind = match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        let mut result = CallResult::Resource(ResourceResult {
            fields: Map::new(),
            errors: self.errors(),
        });
        result.platform_errors_mut().add_error(
            codes::PLATFORM_FAULT,
            Some(Reference::new().with(
                "message",
                format!(
                    "Unexpected JSON {kind} returned for {} on {}",
                    target.action, target.resource
                ),
            )),
        );
        result
    }

    fn failure(&self, target: &Target, code: &str, reference: Option<Reference>) -> CallResult {
        let mut errors = self.errors();
        errors.add_error(code, reference);
        CallResult::empty_for(target.action, errors)
    }

    fn errors(&self) -> ErrorCollection {
        ErrorCollection::with_descriptions(Arc::clone(&self.descriptions))
    }
}

fn endpoint_reference(target: &Target) -> Reference {
    Reference::new().with(
        "entity_name",
        format!(
            "v{} of {} interface endpoint",
            target.version, target.resource
        ),
    )
}
