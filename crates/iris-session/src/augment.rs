//! Session permission augmentation.
//!
//! An interface can declare extra permissions it needs when calling other
//! resources from one of its actions. Before such a call the caller's
//! session is copied under a fresh id, the extra permissions are merged in
//! additively and the copy is persisted. The original session is never
//! touched, and the copy simply expires with the original.

use std::sync::Arc;

use iris_core::{Permissions, Session};

use crate::error::AugmentationError;
use crate::store::SessionStore;

/// Produces augmented sessions for inter-resource calls.
#[derive(Debug, Clone)]
pub struct SessionPermissionAugmenter {
    store: Arc<dyn SessionStore>,
}

impl SessionPermissionAugmenter {
    /// Creates an augmenter persisting into `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Returns the session to use for a downstream call.
    ///
    /// With no extra permissions, `current` itself is returned and nothing
    /// is written. Otherwise a new session is persisted whose permissions
    /// are the pointwise strongest of `current` and `extra`.
    ///
    /// # Errors
    ///
    /// Returns [`AugmentationError`] if the augmented session cannot be
    /// persisted.
    pub async fn augment(
        &self,
        current: &Arc<Session>,
        extra: Option<&Permissions>,
    ) -> Result<Arc<Session>, AugmentationError> {
        let Some(extra) = extra.filter(|extra| !extra.is_empty()) else {
            return Ok(Arc::clone(current));
        };

        let mut augmented = current.duplicate();
        let written = augmented.permissions.merge_additive(extra);
        self.store.save(&augmented).await?;

        iris_telemetry::record_session_augmented();
        tracing::debug!(
            session_id = %current.session_id,
            augmented_session_id = %augmented.session_id,
            rules_written = written,
            "Augmented session persisted"
        );

        Ok(Arc::new(augmented))
    }
}
