//! Identity assumption.
//!
//! A caller may act as a different identity on a request, provided its
//! session scoping authorises it. The assumed identity is a set of
//! `name → value` pairs sent as the `X-Assume-Identity-Of` header in
//! `application/x-www-form-urlencoded` form, e.g. `account_id=1&member_id=m2`.
//!
//! ## Authorisation rules
//!
//! The session's `authorised_identities` scoping is a rule map. Each rule
//! key names an identity field and maps to either:
//!
//! - an array of permitted values, or
//! - an object whose keys are permitted values, each mapping to a nested
//!   rule map that governs the remaining fields.
//!
//! ```json
//! {
//!   "account_id": {
//!     "acc1": { "member_id": ["m1", "m2"] }
//!   },
//!   "device_id": ["d1"]
//! }
//! ```
//!
//! Every assumed field must be consumed by some rule on the path taken.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Why an identity assumption was rejected.
///
/// Only ever logged. Clients receive `platform.forbidden` without detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityRejection {
    /// The header could not be decoded.
    #[error("malformed identity assumption")]
    Malformed,

    /// A field is not covered by any rule.
    #[error("identity field '{field}' may not be assumed")]
    FieldNotAuthorised {
        /// The offending field.
        field: String,
    },

    /// A field's value is not permitted by its rule.
    #[error("value for identity field '{field}' may not be assumed")]
    ValueNotAuthorised {
        /// The offending field.
        field: String,
    },
}

/// An ordered set of identity fields to assume.
///
/// # Example
///
/// ```
/// use iris_core::AssumedIdentity;
///
/// let identity = AssumedIdentity::new()
///     .with("account_id", "acc 1")
///     .with("member_id", "m2");
/// assert_eq!(identity.to_header_value(), "account_id=acc%201&member_id=m2");
///
/// let parsed = AssumedIdentity::parse_header("account_id=acc%201&member_id=m2").unwrap();
/// assert_eq!(parsed, identity);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssumedIdentity(IndexMap<String, String>);

impl AssumedIdentity {
    /// Creates an empty assumption.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns `true` if no fields are assumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(field, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the assumption for the `X-Assume-Identity-Of` header.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.0
            .iter()
            .map(|(field, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(field),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Decodes an `X-Assume-Identity-Of` header value.
    pub fn parse_header(value: &str) -> Result<Self, IdentityRejection> {
        let mut fields = IndexMap::new();
        for pair in value.split('&').filter(|pair| !pair.is_empty()) {
            let (field, value) = pair.split_once('=').ok_or(IdentityRejection::Malformed)?;
            let field = urlencoding::decode(&field.replace('+', " "))
                .map_err(|_| IdentityRejection::Malformed)?
                .into_owned();
            let value = urlencoding::decode(&value.replace('+', " "))
                .map_err(|_| IdentityRejection::Malformed)?
                .into_owned();
            if field.is_empty() {
                return Err(IdentityRejection::Malformed);
            }
            fields.insert(field, value);
        }
        if fields.is_empty() {
            return Err(IdentityRejection::Malformed);
        }
        Ok(Self(fields))
    }

    /// Checks this assumption against an `authorised_identities` rule map.
    pub fn validate_against(&self, rules: &Map<String, Value>) -> Result<(), IdentityRejection> {
        let mut remaining = self.0.clone();
        consume(&mut remaining, rules)?;
        match remaining.keys().next() {
            Some(field) => Err(IdentityRejection::FieldNotAuthorised {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Overlays the assumed fields onto an identity map.
    pub fn apply_to(&self, identity: &mut Map<String, Value>) {
        for (field, value) in &self.0 {
            identity.insert(field.clone(), Value::from(value.as_str()));
        }
    }
}

impl fmt::Display for AssumedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

fn consume(
    remaining: &mut IndexMap<String, String>,
    rules: &Map<String, Value>,
) -> Result<(), IdentityRejection> {
    for (field, rule) in rules {
        let Some(value) = remaining.shift_remove(field) else {
            continue;
        };
        let rejected = || IdentityRejection::ValueNotAuthorised {
            field: field.clone(),
        };
        match rule {
            Value::Array(permitted) => {
                if !permitted.iter().any(|p| value_matches(p, &value)) {
                    return Err(rejected());
                }
            }
            Value::Object(nested) => match nested.get(&value) {
                Some(Value::Object(sub_rules)) => consume(remaining, sub_rules)?,
                Some(_) => {}
                None => return Err(rejected()),
            },
            _ => return Err(rejected()),
        }
    }
    Ok(())
}

fn value_matches(permitted: &Value, value: &str) -> bool {
    match permitted {
        Value::String(s) => s == value,
        Value::Number(n) => n.to_string() == value,
        Value::Bool(b) => b.to_string() == value,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> Map<String, Value> {
        json!({
            "account_id": {
                "acc1": { "member_id": ["m1", "m2"] },
                "acc2": null
            },
            "device_id": ["d1", 7]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_nested_rules_accept() {
        let identity = AssumedIdentity::new()
            .with("account_id", "acc1")
            .with("member_id", "m2");
        assert_eq!(identity.validate_against(&rules()), Ok(()));

        let identity = AssumedIdentity::new().with("device_id", "7");
        assert_eq!(identity.validate_against(&rules()), Ok(()));
    }

    #[test]
    fn test_leaf_value_without_nested_rules() {
        let identity = AssumedIdentity::new().with("account_id", "acc2");
        assert_eq!(identity.validate_against(&rules()), Ok(()));

        let identity = AssumedIdentity::new()
            .with("account_id", "acc2")
            .with("member_id", "m1");
        assert_eq!(
            identity.validate_against(&rules()),
            Err(IdentityRejection::FieldNotAuthorised {
                field: "member_id".into()
            })
        );
    }

    #[test]
    fn test_value_rejected() {
        let identity = AssumedIdentity::new()
            .with("account_id", "acc1")
            .with("member_id", "m3");
        assert_eq!(
            identity.validate_against(&rules()),
            Err(IdentityRejection::ValueNotAuthorised {
                field: "member_id".into()
            })
        );
    }

    #[test]
    fn test_nested_field_needs_parent() {
        let identity = AssumedIdentity::new().with("member_id", "m1");
        assert!(matches!(
            identity.validate_against(&rules()),
            Err(IdentityRejection::FieldNotAuthorised { .. })
        ));
    }

    #[test]
    fn test_empty_rules_reject_everything() {
        let identity = AssumedIdentity::new().with("account_id", "acc1");
        assert!(identity.validate_against(&Map::new()).is_err());
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        assert_eq!(
            AssumedIdentity::parse_header(""),
            Err(IdentityRejection::Malformed)
        );
        assert_eq!(
            AssumedIdentity::parse_header("novalue"),
            Err(IdentityRejection::Malformed)
        );
        assert_eq!(
            AssumedIdentity::parse_header("=x"),
            Err(IdentityRejection::Malformed)
        );
    }

    #[test]
    fn test_parse_header_plus_as_space() {
        let parsed = AssumedIdentity::parse_header("name=a+b").unwrap();
        assert_eq!(parsed.get("name"), Some("a b"));
    }

    #[test]
    fn test_apply_to_overlays() {
        let mut identity = json!({"caller": "x", "account_id": "old"})
            .as_object()
            .cloned()
            .unwrap();
        AssumedIdentity::new()
            .with("account_id", "new")
            .apply_to(&mut identity);
        assert_eq!(identity["account_id"], "new");
        assert_eq!(identity["caller"], "x");
    }
}
