//! Session permissions.
//!
//! Permissions are a two-level policy table:
//!
//! ```json
//! {
//!   "resources": {
//!     "Widget": { "actions": { "list": "allow", "show": "ask" }, "else": "deny" }
//!   },
//!   "default": { "actions": { "show": "allow" }, "else": "deny" }
//! }
//! ```
//!
//! The effective policy for `(resource, action)` is the first one found in:
//! resource action, resource `else`, default action, default `else`, and
//! finally [`Policy::Deny`].

use crate::action::Action;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A permission policy.
///
/// Policies are ordered by strength: `Deny < Ask < Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// The action is refused.
    Deny,
    /// The resource implementation decides via `verify`.
    Ask,
    /// The action is permitted.
    Allow,
}

impl Policy {
    /// Returns the stronger of two policies.
    #[must_use]
    pub fn strongest(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Policies for one resource (or for the default section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermissions {
    /// Per-action policies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<Action, Policy>,
    /// Policy for actions not listed in `actions`.
    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_policy: Option<Policy>,
}

impl ResourcePermissions {
    fn lookup(&self, action: Action) -> Option<Policy> {
        self.actions.get(&action).copied().or(self.else_policy)
    }

    fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.else_policy.is_none()
    }
}

/// A permission table.
///
/// # Example
///
/// ```
/// use iris_core::{Action, Permissions, Policy};
///
/// let mut permissions = Permissions::new();
/// permissions.set_resource("Widget", Action::List, Policy::Allow);
/// permissions.set_default_fallback(Policy::Ask);
///
/// assert_eq!(permissions.permitted("Widget", Action::List), Policy::Allow);
/// assert_eq!(permissions.permitted("Widget", Action::Show), Policy::Ask);
/// assert_eq!(Permissions::new().permitted("Widget", Action::List), Policy::Deny);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Per-resource sections.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourcePermissions>,
    /// Section consulted when the resource section has no answer.
    #[serde(default, skip_serializing_if = "ResourcePermissions::is_empty")]
    pub default: ResourcePermissions,
}

impl Permissions {
    /// Creates an empty table that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table that allows everything.
    #[must_use]
    pub fn allow_all() -> Self {
        let mut permissions = Self::new();
        permissions.set_default_fallback(Policy::Allow);
        permissions
    }

    /// Sets the policy for one action on one resource.
    pub fn set_resource(
        &mut self,
        resource: impl Into<String>,
        action: Action,
        policy: Policy,
    ) -> &mut Self {
        self.resources
            .entry(resource.into())
            .or_default()
            .actions
            .insert(action, policy);
        self
    }

    /// Sets the fallback policy for one resource.
    pub fn set_resource_fallback(&mut self, resource: impl Into<String>, policy: Policy) -> &mut Self {
        self.resources.entry(resource.into()).or_default().else_policy = Some(policy);
        self
    }

    /// Sets the default policy for one action.
    pub fn set_default(&mut self, action: Action, policy: Policy) -> &mut Self {
        self.default.actions.insert(action, policy);
        self
    }

    /// Sets the default fallback policy.
    pub fn set_default_fallback(&mut self, policy: Policy) -> &mut Self {
        self.default.else_policy = Some(policy);
        self
    }

    /// Builder form of [`set_resource`](Self::set_resource).
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>, action: Action, policy: Policy) -> Self {
        self.set_resource(resource, action, policy);
        self
    }

    /// Returns the effective policy for `(resource, action)`.
    #[must_use]
    pub fn permitted(&self, resource: &str, action: Action) -> Policy {
        self.resources
            .get(resource)
            .and_then(|section| section.lookup(action))
            .unwrap_or_else(|| self.default_policy(action))
    }

    fn default_policy(&self, action: Action) -> Policy {
        self.default.lookup(action).unwrap_or(Policy::Deny)
    }

    /// Returns `true` if the table contains no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(ResourcePermissions::is_empty) && self.default.is_empty()
    }

    /// Merges `other` into this table, only ever strengthening policies.
    ///
    /// Afterwards, for every resource and action, the effective policy is
    /// the stronger of the two tables' effective policies. Returns the
    /// number of rules written.
    pub fn merge_additive(&mut self, other: &Self) -> usize {
        let resources: BTreeSet<String> = self
            .resources
            .keys()
            .chain(other.resources.keys())
            .cloned()
            .collect();

        // Targets are fixed before the default section changes.
        let mut targets = Vec::with_capacity(resources.len() * Action::ALL.len());
        for resource in resources {
            for action in Action::ALL {
                let target = self
                    .permitted(&resource, action)
                    .strongest(other.permitted(&resource, action));
                targets.push((resource.clone(), action, target));
            }
        }

        let mut written = 0;
        for action in Action::ALL {
            let current = self.default_policy(action);
            let target = current.strongest(other.default_policy(action));
            if target > current {
                self.set_default(action, target);
                written += 1;
            }
        }

        for (resource, action, target) in targets {
            if self.permitted(&resource, action) != target {
                self.set_resource(resource, action, target);
                written += 1;
            }
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lookup_order() {
        let mut p = Permissions::new();
        assert_eq!(p.permitted("A", Action::Show), Policy::Deny);

        p.set_default_fallback(Policy::Ask);
        assert_eq!(p.permitted("A", Action::Show), Policy::Ask);

        p.set_default(Action::Show, Policy::Allow);
        assert_eq!(p.permitted("A", Action::Show), Policy::Allow);

        p.set_resource_fallback("A", Policy::Deny);
        assert_eq!(p.permitted("A", Action::Show), Policy::Deny);
        assert_eq!(p.permitted("B", Action::Show), Policy::Allow);

        p.set_resource("A", Action::Show, Policy::Ask);
        assert_eq!(p.permitted("A", Action::Show), Policy::Ask);
        assert_eq!(p.permitted("A", Action::List), Policy::Deny);
    }

    #[test]
    fn test_policy_strength() {
        assert!(Policy::Allow > Policy::Ask);
        assert!(Policy::Ask > Policy::Deny);
        assert_eq!(Policy::Deny.strongest(Policy::Ask), Policy::Ask);
    }

    #[test]
    fn test_merge_never_downgrades_through_resource_fallback() {
        let mut session = Permissions::new();
        session.set_default(Action::List, Policy::Allow);

        let mut extra = Permissions::new();
        extra.set_resource_fallback("Widget", Policy::Ask);

        session.merge_additive(&extra);
        assert_eq!(session.permitted("Widget", Action::List), Policy::Allow);
        assert_eq!(session.permitted("Widget", Action::Show), Policy::Ask);
        assert_eq!(session.permitted("Other", Action::Show), Policy::Deny);
    }

    #[test]
    fn test_merge_adds_grant() {
        let mut session = Permissions::new();
        session.set_resource("A", Action::Show, Policy::Allow);

        let extra = Permissions::new().with_resource("B", Action::List, Policy::Allow);

        assert_eq!(session.merge_additive(&extra), 1);
        assert_eq!(session.permitted("A", Action::Show), Policy::Allow);
        assert_eq!(session.permitted("B", Action::List), Policy::Allow);
        assert_eq!(session.permitted("B", Action::Show), Policy::Deny);
    }

    #[test]
    fn test_merge_with_empty_is_noop() {
        let mut session = Permissions::new().with_resource("A", Action::Show, Policy::Ask);
        let before = session.clone();
        assert_eq!(session.merge_additive(&Permissions::new()), 0);
        assert_eq!(session, before);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::json!({
            "resources": {
                "Widget": { "actions": { "list": "allow" }, "else": "ask" }
            },
            "default": { "else": "deny" }
        });
        let p: Permissions = serde_json::from_value(json).unwrap();
        assert_eq!(p.permitted("Widget", Action::List), Policy::Allow);
        assert_eq!(p.permitted("Widget", Action::Delete), Policy::Ask);
        assert_eq!(p.permitted("Gadget", Action::List), Policy::Deny);
    }

    fn policy() -> impl Strategy<Value = Policy> {
        prop_oneof![Just(Policy::Deny), Just(Policy::Ask), Just(Policy::Allow)]
    }

    fn action() -> impl Strategy<Value = Action> {
        prop::sample::select(Action::ALL.to_vec())
    }

    fn section() -> impl Strategy<Value = ResourcePermissions> {
        (
            prop::collection::btree_map(action(), policy(), 0..4),
            prop::option::of(policy()),
        )
            .prop_map(|(actions, else_policy)| ResourcePermissions {
                actions,
                else_policy,
            })
    }

    fn permissions() -> impl Strategy<Value = Permissions> {
        (
            prop::collection::btree_map(
                prop::sample::select(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
                section(),
                0..3,
            ),
            section(),
        )
            .prop_map(|(resources, default)| Permissions { resources, default })
    }

    proptest! {
        #[test]
        fn prop_merge_is_pointwise_strongest(session in permissions(), extra in permissions()) {
            let mut merged = session.clone();
            merged.merge_additive(&extra);

            for resource in ["A", "B", "C", "Unlisted"] {
                for action in Action::ALL {
                    let expected = session
                        .permitted(resource, action)
                        .strongest(extra.permitted(resource, action));
                    prop_assert_eq!(merged.permitted(resource, action), expected);
                }
            }
        }

        #[test]
        fn prop_merge_is_idempotent(session in permissions(), extra in permissions()) {
            let mut once = session.clone();
            once.merge_additive(&extra);
            let mut twice = once.clone();
            prop_assert_eq!(twice.merge_additive(&extra), 0);
            prop_assert_eq!(twice, once);
        }
    }
}
