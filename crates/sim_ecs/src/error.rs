//! Store error types and the validation reporting policy.
//!
//! Every entity-accepting operation validates its handle before touching any
//! state; failures surface as [`StoreError`] values. How a failure reaches
//! the caller is decided once, at manager construction, by [`ErrorPolicy`]:
//! either the operation returns `Err`, or a registered handler is invoked
//! and the process aborts. The store never silently continues past an
//! invalid handle or a missing component.

use sim_component::Entity;

/// Why a handle failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BadEntityReason {
    /// The handle was issued by a different manager instance.
    #[error("handle was issued by a different manager")]
    ForeignManager,

    /// The entity no longer exists in the directory.
    #[error("entity no longer exists")]
    NotFound,

    /// The entity exists, but it was mutated through another handle since
    /// this handle was issued.
    #[error("handle is stale (saw version {seen}, current is {current})")]
    Stale {
        /// The entity version recorded in the handle.
        seen: u64,
        /// The entity's current version.
        current: u64,
    },
}

/// Errors reported by entity-accepting store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Handle validation failed; no state was touched.
    #[error("bad handle for {entity}: {reason}")]
    BadEntity {
        /// The entity the handle refers to.
        entity: Entity,
        /// Which validation check failed.
        reason: BadEntityReason,
    },

    /// A component was requested from a validated entity that does not
    /// currently hold it.
    #[error("component `{type_name}` is not attached to {entity}")]
    MissingComponent {
        /// The validated entity.
        entity: Entity,
        /// Declared name of the requested component type.
        type_name: &'static str,
    },
}

/// Handler invoked for a validation failure under [`ErrorPolicy::Fatal`].
pub type FatalHandler = fn(&StoreError);

/// How the manager reports validation failures.
///
/// Chosen at construction and fixed for the manager's lifetime.
#[derive(Debug, Clone, Copy)]
pub enum ErrorPolicy {
    /// Operations return `Err(StoreError)` to the caller.
    Propagate,

    /// The handler is invoked with the error, then the process aborts.
    /// Validation failures are treated as unrecoverable.
    Fatal(FatalHandler),
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::Propagate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_entity_display() {
        let err = StoreError::BadEntity {
            entity: Entity::from_raw(7),
            reason: BadEntityReason::NotFound,
        };
        assert_eq!(
            err.to_string(),
            "bad handle for Entity(7): entity no longer exists"
        );
    }

    #[test]
    fn test_stale_display_carries_versions() {
        let reason = BadEntityReason::Stale {
            seen: 2,
            current: 5,
        };
        assert_eq!(
            reason.to_string(),
            "handle is stale (saw version 2, current is 5)"
        );
    }

    #[test]
    fn test_missing_component_display() {
        let err = StoreError::MissingComponent {
            entity: Entity::from_raw(3),
            type_name: "Position",
        };
        assert_eq!(
            err.to_string(),
            "component `Position` is not attached to Entity(3)"
        );
    }

    #[test]
    fn test_default_policy_propagates() {
        assert!(matches!(ErrorPolicy::default(), ErrorPolicy::Propagate));
    }
}
