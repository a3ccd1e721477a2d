//! Entity handles and manager identity.
//!
//! An [`EntityHandle`] is a value snapshot of an entity, not a live
//! reference: it records the entity's ID, the manager that issued it, and
//! the entity version it saw. The manager revalidates every handle it is
//! given before trusting it (see the validation outcomes on
//! [`BadEntityReason`](crate::BadEntityReason)).

use sim_component::Entity;
use uuid::Uuid;

/// Identity of one manager instance.
///
/// Handles carry the ID of the manager that issued them, so a handle
/// presented to a different manager is rejected rather than misapplied to
/// an unrelated entity that happens to share the numeric ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(Uuid);

impl ManagerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value snapshot of an entity.
///
/// Handles are cheap to copy and carry no borrow of the store. Two handles
/// to the same entity are independent snapshots: a successful attachment
/// mutation through one bumps the entity's version and refreshes that
/// handle in place, so the *other* handle becomes stale and is rejected on
/// its next use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHandle {
    entity: Entity,
    manager: ManagerId,
    version: u64,
}

impl EntityHandle {
    pub(crate) fn new(entity: Entity, manager: ManagerId, version: u64) -> Self {
        Self {
            entity,
            manager,
            version,
        }
    }

    /// The entity this handle refers to.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The manager that issued this handle.
    #[must_use]
    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    /// The entity version this handle last saw.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Re-sync the handle with the canonical entity version after a
    /// successful mutation through it.
    pub(crate) fn refresh(&mut self, version: u64) {
        self.version = version;
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.entity, self.version)
    }
}
