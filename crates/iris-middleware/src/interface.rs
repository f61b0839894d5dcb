//! Resource interfaces.
//!
//! An [`Interface`] describes one versioned resource endpoint hosted by a
//! service: which actions it implements, which of them need no session,
//! which extra permissions its actions need for the calls they make, and
//! which domain errors it may report.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use iris_core::{Action, ErrorDescriptions, Permissions};

use crate::resource::Resource;

/// A hosted resource interface.
///
/// # Example
///
/// ```
/// use iris_core::{Action, Permissions, Policy};
/// use iris_middleware::{Interface, Resource};
///
/// struct Widgets;
/// impl Resource for Widgets {}
///
/// let interface = Interface::new("Widget", 1, "widgets", Widgets)
///     .with_actions([Action::List, Action::Show])
///     .with_public_actions([Action::List])
///     .with_additional_permissions(
///         Action::Show,
///         Permissions::new().with_resource("Gadget", Action::Show, Policy::Allow),
///     )
///     .with_domain_error("widgets", "sold_out", 409, "Sold out");
///
/// assert!(interface.implements(Action::Show));
/// assert!(!interface.implements(Action::Delete));
/// assert!(interface.is_public(Action::List));
/// assert_eq!(interface.descriptions().describe("widgets.sold_out").unwrap().status, 409);
/// ```
pub struct Interface {
    resource: String,
    version: u32,
    endpoint: String,
    actions: Vec<Action>,
    public_actions: Vec<Action>,
    additional_permissions: HashMap<Action, Permissions>,
    descriptions: Arc<ErrorDescriptions>,
    implementation: Arc<dyn Resource>,
}

impl Interface {
    /// Creates an interface implementing all five actions.
    ///
    /// `endpoint` is the path segment, as in `/v{version}/{endpoint}`.
    pub fn new(
        resource: impl Into<String>,
        version: u32,
        endpoint: impl Into<String>,
        implementation: impl Resource,
    ) -> Self {
        Self {
            resource: resource.into(),
            version,
            endpoint: endpoint.into().trim_matches('/').to_string(),
            actions: Action::ALL.to_vec(),
            public_actions: Vec::new(),
            additional_permissions: HashMap::new(),
            descriptions: Arc::new(ErrorDescriptions::new()),
            implementation: Arc::new(implementation),
        }
    }

    /// Restricts the implemented actions.
    #[must_use]
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    /// Marks actions as callable without a session.
    #[must_use]
    pub fn with_public_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.public_actions = actions.into_iter().collect();
        self
    }

    /// Declares extra permissions `action` needs for the calls it makes.
    ///
    /// Repeated declarations for one action are merged.
    #[must_use]
    pub fn with_additional_permissions(mut self, action: Action, permissions: Permissions) -> Self {
        self.additional_permissions
            .entry(action)
            .or_default()
            .merge_additive(&permissions);
        self
    }

    /// Declares a domain error `domain.name`.
    #[must_use]
    pub fn with_domain_error(
        mut self,
        domain: &str,
        name: &str,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.descriptions).define(format!("{domain}.{name}"), status, message);
        self
    }

    /// Resource name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Interface version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Endpoint path segment.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Path of the collection, `/v{version}/{endpoint}`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/v{}/{}", self.version, self.endpoint)
    }

    /// Returns `true` if `action` is implemented.
    #[must_use]
    pub fn implements(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// Returns `true` if `action` needs no session.
    #[must_use]
    pub fn is_public(&self, action: Action) -> bool {
        self.public_actions.contains(&action)
    }

    /// Extra permissions declared for `action`.
    #[must_use]
    pub fn additional_permissions(&self, action: Action) -> Option<&Permissions> {
        self.additional_permissions.get(&action)
    }

    /// Error codes this interface may report.
    #[must_use]
    pub fn descriptions(&self) -> &Arc<ErrorDescriptions> {
        &self.descriptions
    }

    pub(crate) fn implementation(&self) -> &dyn Resource {
        self.implementation.as_ref()
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("resource", &self.resource)
            .field("version", &self.version)
            .field("endpoint", &self.endpoint)
            .field("actions", &self.actions)
            .field("public_actions", &self.public_actions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::Policy;

    struct Nothing;
    impl Resource for Nothing {}

    #[test]
    fn test_defaults() {
        let interface = Interface::new("Widget", 2, "/widgets/", Nothing);
        assert_eq!(interface.endpoint(), "widgets");
        assert_eq!(interface.path(), "/v2/widgets");
        for action in Action::ALL {
            assert!(interface.implements(action));
            assert!(!interface.is_public(action));
            assert!(interface.additional_permissions(action).is_none());
        }
        assert!(interface.descriptions().contains("platform.not_found"));
    }

    #[test]
    fn test_additional_permissions_merge() {
        let interface = Interface::new("Widget", 1, "widgets", Nothing)
            .with_additional_permissions(
                Action::List,
                Permissions::new().with_resource("A", Action::List, Policy::Allow),
            )
            .with_additional_permissions(
                Action::List,
                Permissions::new().with_resource("B", Action::Show, Policy::Ask),
            );

        let extra = interface.additional_permissions(Action::List).unwrap();
        assert_eq!(extra.permitted("A", Action::List), Policy::Allow);
        assert_eq!(extra.permitted("B", Action::Show), Policy::Ask);
    }

    #[test]
    fn test_domain_errors_do_not_leak() {
        let plain = Interface::new("Widget", 1, "widgets", Nothing);
        let custom = Interface::new("Gadget", 1, "gadgets", Nothing)
            .with_domain_error("gadgets", "broken", 422, "Broken");

        assert!(custom.descriptions().contains("gadgets.broken"));
        assert!(!plain.descriptions().contains("gadgets.broken"));
        assert!(!ErrorDescriptions::platform().contains("gadgets.broken"));
    }
}
