//! Inter-resource call results.
//!
//! Whatever transport carried an inter-resource call, the caller receives a
//! [`CallResult`]: either a collection or a single resource, each with an
//! embedded [`ErrorCollection`]. Callers check
//! [`has_errors`](CallResult::has_errors) and decide whether to continue.

use crate::action::Action;
use crate::collection::ErrorCollection;
use serde_json::{Map, Value};

/// Result of a list-like call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionResult {
    /// Items returned.
    pub items: Vec<Value>,
    /// Total dataset size, if reported.
    pub dataset_size: Option<u64>,
    /// Estimated dataset size, if reported.
    pub estimated_dataset_size: Option<u64>,
    /// Errors reported by or about the call.
    pub errors: ErrorCollection,
}

/// Result of a single-resource call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceResult {
    /// The resource representation.
    pub fields: Map<String, Value>,
    /// Errors reported by or about the call.
    pub errors: ErrorCollection,
}

impl ResourceResult {
    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Uniform result of an inter-resource call.
///
/// # Example
///
/// ```
/// use iris_core::{Action, CallResult, ErrorCollection};
///
/// let mut errors = ErrorCollection::new();
/// errors.add_error("platform.not_found", None);
///
/// let result = CallResult::empty_for(Action::List, errors);
/// assert!(result.has_errors());
/// assert!(result.as_collection().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// An array-like result.
    Collection(CollectionResult),
    /// An object-like result.
    Resource(ResourceResult),
}

impl CallResult {
    /// An empty result in the natural shape of `action`.
    #[must_use]
    pub fn empty_for(action: Action, errors: ErrorCollection) -> Self {
        if action.returns_collection() {
            Self::Collection(CollectionResult {
                errors,
                ..CollectionResult::default()
            })
        } else {
            Self::Resource(ResourceResult {
                fields: Map::new(),
                errors,
            })
        }
    }

    /// Returns `true` if any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.platform_errors().has_errors()
    }

    /// The embedded errors.
    #[must_use]
    pub const fn platform_errors(&self) -> &ErrorCollection {
        match self {
            Self::Collection(result) => &result.errors,
            Self::Resource(result) => &result.errors,
        }
    }

    /// Mutable access to the embedded errors.
    pub fn platform_errors_mut(&mut self) -> &mut ErrorCollection {
        match self {
            Self::Collection(result) => &mut result.errors,
            Self::Resource(result) => &mut result.errors,
        }
    }

    /// Returns the collection, if this is one.
    #[must_use]
    pub const fn as_collection(&self) -> Option<&CollectionResult> {
        match self {
            Self::Collection(result) => Some(result),
            Self::Resource(_) => None,
        }
    }

    /// Returns the resource, if this is one.
    #[must_use]
    pub const fn as_resource(&self) -> Option<&ResourceResult> {
        match self {
            Self::Resource(result) => Some(result),
            Self::Collection(_) => None,
        }
    }

    /// Converts the payload (without errors) to JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Collection(result) => Value::Array(result.items.clone()),
            Self::Resource(result) => Value::Object(result.fields.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptions::codes;
    use serde_json::json;

    #[test]
    fn test_empty_for_natural_shape() {
        assert!(CallResult::empty_for(Action::List, ErrorCollection::new())
            .as_collection()
            .is_some());
        for action in [Action::Show, Action::Create, Action::Update, Action::Delete] {
            assert!(CallResult::empty_for(action, ErrorCollection::new())
                .as_resource()
                .is_some());
        }
    }

    #[test]
    fn test_errors_reachable_from_both_shapes() {
        let mut result = CallResult::empty_for(Action::Show, ErrorCollection::new());
        assert!(!result.has_errors());
        result
            .platform_errors_mut()
            .add_error(codes::PLATFORM_TIMEOUT, None);
        assert!(result.has_errors());
        assert_eq!(result.platform_errors().http_status(), 408);
    }

    #[test]
    fn test_to_json() {
        let result = CallResult::Resource(ResourceResult {
            fields: json!({"inner": "shown"}).as_object().cloned().unwrap(),
            errors: ErrorCollection::new(),
        });
        assert_eq!(result.to_json(), json!({"inner": "shown"}));
        assert_eq!(result.as_resource().unwrap().get("inner"), Some(&json!("shown")));
    }
}
