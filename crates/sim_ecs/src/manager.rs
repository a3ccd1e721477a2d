//! The entity manager — the store's façade.
//!
//! An [`EntityManager`] owns three views of the same population and keeps
//! them in agreement after every mutation:
//!
//! - the **directory** — one record per live entity, holding the canonical
//!   attachment mask and version (`BTreeMap`, ascending ID),
//! - one **component table** per declared component type — the owned values,
//!   keyed by entity (`BTreeMap`, ascending ID),
//! - one **attachment index** per declared type — the IDs currently holding
//!   that type's bit (`BTreeSet`, ascending ID), used to bound query cost.
//!
//! Indices hold IDs only; the directory record is the single source of
//! truth for an entity's mask, so flipping one bit never requires patching
//! per-index copies.
//!
//! Handles returned by the manager are snapshots. A successful attach or
//! detach through a handle bumps the entity's version and refreshes that
//! handle in place — any other handle to the same entity goes stale and is
//! rejected with [`BadEntityReason::Stale`] on its next use.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, trace};

use sim_component::{
    Attachment, AttachmentKind, AttachmentMask, AttachmentRegistry, Component, Entity,
    EntityAllocator, RegistryBuilder, Tag,
};

use crate::error::{BadEntityReason, ErrorPolicy, StoreError};
use crate::handle::{EntityHandle, ManagerId};

/// Canonical per-entity state.
#[derive(Debug)]
pub(crate) struct EntityRecord {
    /// Which declared types this entity currently holds.
    pub(crate) mask: AttachmentMask,
    /// Bumped on every successful attach/detach; compared against the
    /// version a handle saw.
    pub(crate) version: u64,
}

/// Object-safe face of a typed component table, so the manager can hold one
/// table per slot without knowing the component types at this level.
pub(crate) trait AnyTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Drop the value stored for `entity`, if any. Returns whether a value
    /// was present.
    fn discard(&mut self, entity: Entity) -> bool;
}

/// Storage for one component type: values keyed by entity, ascending ID.
///
/// The ascending-ID ordering is a hard invariant — the iteration engine's
/// forward-only cursors depend on it.
pub(crate) struct ComponentTable<T: Component> {
    pub(crate) rows: BTreeMap<Entity, T>,
}

impl<T: Component> ComponentTable<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Component> AnyTable for ComponentTable<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn discard(&mut self, entity: Entity) -> bool {
        self.rows.remove(&entity).is_some()
    }
}

fn new_table<T: Component>() -> Box<dyn AnyTable> {
    Box::new(ComponentTable::<T>::new())
}

/// The entity store.
///
/// Parameterized once, at construction, by the closed set of declared
/// component and tag types (see [`EntityManager::builder`]); the set is
/// immutable for the manager's lifetime.
///
/// The manager is single-threaded and synchronous: operations complete
/// before returning and there is no internal locking. Callers that need
/// cross-thread access wrap the whole manager in one external lock.
pub struct EntityManager {
    pub(crate) id: ManagerId,
    registry: AttachmentRegistry,
    policy: ErrorPolicy,
    allocator: EntityAllocator,
    /// Canonical ordered set of live entities.
    pub(crate) directory: BTreeMap<Entity, EntityRecord>,
    /// One table per slot; `None` for tag slots.
    stores: Vec<Option<Box<dyn AnyTable>>>,
    /// One ID set per slot.
    pub(crate) indices: Vec<BTreeSet<Entity>>,
}

impl EntityManager {
    /// Start declaring the manager's type set.
    #[must_use]
    pub fn builder() -> EntityManagerBuilder {
        EntityManagerBuilder {
            registry: AttachmentRegistry::builder(),
            table_makers: Vec::new(),
            policy: ErrorPolicy::default(),
        }
    }

    /// This manager's instance identity.
    #[must_use]
    pub fn manager_id(&self) -> ManagerId {
        self.id
    }

    /// The declared type set this manager was built over.
    #[must_use]
    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.directory.len()
    }

    /// Returns `true` if `entity` is currently live.
    ///
    /// This is a plain liveness probe on the ID, not handle validation.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.directory.contains_key(&entity)
    }

    /// Number of live entities currently holding attachment type `A`.
    ///
    /// # Panics
    ///
    /// Panics if `A` is not declared for this manager.
    #[must_use]
    pub fn attachment_count<A: Attachment>(&self) -> usize {
        self.indices[self.slot_of::<A>()].len()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a new entity with no attachments and return a handle to it.
    ///
    /// IDs increase monotonically and are never reused, even after the
    /// entity is deleted.
    ///
    /// # Panics
    ///
    /// Panics if the entity ID space is exhausted.
    pub fn create_entity(&mut self) -> EntityHandle {
        let entity = self.allocator.allocate();
        self.directory.insert(
            entity,
            EntityRecord {
                mask: self.registry.empty_mask(),
                version: 0,
            },
        );
        debug!(%entity, "created entity");
        EntityHandle::new(entity, self.id, 0)
    }

    /// Delete an entity, dropping every component value it holds and
    /// removing it from every attachment index and the directory.
    ///
    /// Irreversible; the ID is retired. Any handle to the entity reports
    /// [`BadEntityReason::NotFound`] afterwards.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation.
    pub fn delete_entity(&mut self, handle: &EntityHandle) -> Result<(), StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let record = self
            .directory
            .remove(&entity)
            .expect("validated entity is in the directory");
        for slot in record.mask.ones() {
            if let Some(table) = self.stores[slot].as_deref_mut() {
                let had_value = table.discard(entity);
                debug_assert!(
                    had_value,
                    "component table `{}` disagreed with the directory mask",
                    self.registry.name(slot)
                );
            }
            let was_indexed = self.indices[slot].remove(&entity);
            debug_assert!(
                was_indexed,
                "attachment index `{}` disagreed with the directory mask",
                self.registry.name(slot)
            );
        }
        debug!(%entity, "deleted entity");
        Ok(())
    }

    // ── Attachment mutation ──────────────────────────────────────────

    /// Attach a component value to an entity.
    ///
    /// If the entity already holds `T`, nothing is stored or replaced: the
    /// passed value is discarded and the existing value is returned with
    /// `newly_added = false`. Otherwise the value is stored, the entity's
    /// version is bumped, and `handle` is refreshed in place so it does not
    /// itself go stale.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not declared for this manager.
    pub fn add_component<T: Component>(
        &mut self,
        handle: &mut EntityHandle,
        value: T,
    ) -> Result<(&T, bool), StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let slot = self.slot_of::<T>();

        let already = self
            .directory
            .get(&entity)
            .expect("validated entity is in the directory")
            .mask
            .test(slot);
        if already {
            let existing = self
                .table::<T>()
                .rows
                .get(&entity)
                .expect("mask bit is set but the component row is missing");
            return Ok((existing, false));
        }

        let prior = self.table_mut::<T>().rows.insert(entity, value);
        debug_assert!(
            prior.is_none(),
            "mask bit was clear but a component row existed"
        );

        let record = self
            .directory
            .get_mut(&entity)
            .expect("validated entity is in the directory");
        record.mask.set(slot);
        record.version += 1;
        handle.refresh(record.version);

        let newly_indexed = self.indices[slot].insert(entity);
        debug_assert!(
            newly_indexed,
            "attachment index disagreed with the directory mask"
        );

        trace!(%entity, component = T::type_name(), "attached component");
        let stored = self
            .table::<T>()
            .rows
            .get(&entity)
            .expect("row was inserted above");
        Ok((stored, true))
    }

    /// Detach a component from an entity, dropping its value.
    ///
    /// Returns whether a component was actually removed; detaching an
    /// absent component is a no-op that returns `false`. On removal the
    /// entity's version is bumped and `handle` is refreshed in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not declared for this manager.
    pub fn remove_component<T: Component>(
        &mut self,
        handle: &mut EntityHandle,
    ) -> Result<bool, StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let slot = self.slot_of::<T>();

        let present = self
            .directory
            .get(&entity)
            .expect("validated entity is in the directory")
            .mask
            .test(slot);
        if !present {
            return Ok(false);
        }

        let removed = self.table_mut::<T>().rows.remove(&entity);
        debug_assert!(
            removed.is_some(),
            "mask bit was set but no component row existed"
        );

        let record = self
            .directory
            .get_mut(&entity)
            .expect("validated entity is in the directory");
        record.mask.clear(slot);
        record.version += 1;
        handle.refresh(record.version);

        let was_indexed = self.indices[slot].remove(&entity);
        debug_assert!(
            was_indexed,
            "attachment index disagreed with the directory mask"
        );

        trace!(%entity, component = T::type_name(), "detached component");
        Ok(true)
    }

    /// Set or clear a tag on an entity, returning the previous value.
    ///
    /// Writing the value the entity already has is a no-op (no version
    /// bump). On an actual change the entity's version is bumped and
    /// `handle` is refreshed in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not declared for this manager, or is declared as a
    /// component rather than a tag.
    pub fn set_tag<T: Tag>(
        &mut self,
        handle: &mut EntityHandle,
        value: bool,
    ) -> Result<bool, StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let slot = self.slot_of::<T>();
        assert_eq!(
            self.registry.kind(slot),
            AttachmentKind::Tag,
            "attachment type `{}` is declared as a component; use add/remove_component",
            T::type_name()
        );

        let record = self
            .directory
            .get_mut(&entity)
            .expect("validated entity is in the directory");
        let previous = record.mask.test(slot);
        if previous == value {
            return Ok(previous);
        }

        if value {
            record.mask.set(slot);
        } else {
            record.mask.clear(slot);
        }
        record.version += 1;
        handle.refresh(record.version);

        if value {
            self.indices[slot].insert(entity);
        } else {
            self.indices[slot].remove(&entity);
        }

        trace!(%entity, tag = T::type_name(), value, "set tag");
        Ok(previous)
    }

    // ── Access ───────────────────────────────────────────────────────

    /// Get a shared reference to the component value an entity holds.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation;
    /// [`StoreError::MissingComponent`] if the entity does not hold `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not declared for this manager.
    pub fn get_component<T: Component>(&self, handle: &EntityHandle) -> Result<&T, StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let slot = self.slot_of::<T>();
        let record = self
            .directory
            .get(&entity)
            .expect("validated entity is in the directory");
        if !record.mask.test(slot) {
            return self.fail(StoreError::MissingComponent {
                entity,
                type_name: T::type_name(),
            });
        }
        Ok(self
            .table::<T>()
            .rows
            .get(&entity)
            .expect("mask bit is set but the component row is missing"))
    }

    /// Get a mutable reference to the component value an entity holds.
    ///
    /// Mutating the value does not change the entity's attachment set, so
    /// the handle stays valid and no version bump occurs.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation;
    /// [`StoreError::MissingComponent`] if the entity does not hold `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not declared for this manager.
    pub fn get_component_mut<T: Component>(
        &mut self,
        handle: &EntityHandle,
    ) -> Result<&mut T, StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let entity = handle.entity();
        let slot = self.slot_of::<T>();
        let present = self
            .directory
            .get(&entity)
            .expect("validated entity is in the directory")
            .mask
            .test(slot);
        if !present {
            return self.fail(StoreError::MissingComponent {
                entity,
                type_name: T::type_name(),
            });
        }
        Ok(self
            .table_mut::<T>()
            .rows
            .get_mut(&entity)
            .expect("mask bit is set but the component row is missing"))
    }

    /// Returns whether a validated entity currently holds attachment `A`.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadEntity`] if the handle fails validation.
    ///
    /// # Panics
    ///
    /// Panics if `A` is not declared for this manager.
    pub fn has<A: Attachment>(&self, handle: &EntityHandle) -> Result<bool, StoreError> {
        if let Err(err) = self.check(handle) {
            return self.fail(err);
        }
        let slot = self.slot_of::<A>();
        let record = self
            .directory
            .get(&handle.entity())
            .expect("validated entity is in the directory");
        Ok(record.mask.test(slot))
    }

    // ── Validation & reporting ───────────────────────────────────────

    /// Validate a handle against the directory without touching state.
    pub(crate) fn check(&self, handle: &EntityHandle) -> Result<(), StoreError> {
        let entity = handle.entity();
        if handle.manager() != self.id {
            return Err(StoreError::BadEntity {
                entity,
                reason: BadEntityReason::ForeignManager,
            });
        }
        match self.directory.get(&entity) {
            None => Err(StoreError::BadEntity {
                entity,
                reason: BadEntityReason::NotFound,
            }),
            Some(record) if record.version != handle.version() => Err(StoreError::BadEntity {
                entity,
                reason: BadEntityReason::Stale {
                    seen: handle.version(),
                    current: record.version,
                },
            }),
            Some(_) => Ok(()),
        }
    }

    /// Route a validation failure through the configured policy.
    pub(crate) fn fail<T>(&self, err: StoreError) -> Result<T, StoreError> {
        match self.policy {
            ErrorPolicy::Propagate => Err(err),
            ErrorPolicy::Fatal(handler) => {
                error!(%err, "fatal store error");
                handler(&err);
                std::process::abort();
            }
        }
    }

    // ── Slot & table plumbing ────────────────────────────────────────

    /// Resolve an attachment type to its registry slot.
    ///
    /// Requesting an undeclared type is a contract error, not a runtime
    /// data error, and panics.
    pub(crate) fn slot_of<A: Attachment>(&self) -> usize {
        self.registry
            .slot_of(A::attachment_type_id())
            .unwrap_or_else(|| {
                panic!(
                    "attachment type `{}` is not declared for this manager",
                    A::type_name()
                )
            })
    }

    pub(crate) fn table<T: Component>(&self) -> &ComponentTable<T> {
        let slot = self.slot_of::<T>();
        self.stores[slot]
            .as_deref()
            .unwrap_or_else(|| {
                panic!(
                    "attachment type `{}` is declared as a tag and stores no values",
                    T::type_name()
                )
            })
            .as_any()
            .downcast_ref()
            .expect("slot table matches its declared component type")
    }

    pub(crate) fn table_mut<T: Component>(&mut self) -> &mut ComponentTable<T> {
        let slot = self.slot_of::<T>();
        self.stores[slot]
            .as_deref_mut()
            .unwrap_or_else(|| {
                panic!(
                    "attachment type `{}` is declared as a tag and stores no values",
                    T::type_name()
                )
            })
            .as_any_mut()
            .downcast_mut()
            .expect("slot table matches its declared component type")
    }
}

/// Builder for [`EntityManager`].
///
/// Declares the closed component/tag type set and the error policy, then
/// freezes both into a manager.
pub struct EntityManagerBuilder {
    registry: RegistryBuilder,
    table_makers: Vec<Option<fn() -> Box<dyn AnyTable>>>,
    policy: ErrorPolicy,
}

impl EntityManagerBuilder {
    /// Declare a component type.
    ///
    /// # Panics
    ///
    /// Panics if the type is already declared.
    #[must_use]
    pub fn component<T: Component>(mut self) -> Self {
        self.registry = self.registry.component::<T>();
        self.table_makers.push(Some(new_table::<T>));
        self
    }

    /// Declare a tag type.
    ///
    /// # Panics
    ///
    /// Panics if the type is already declared.
    #[must_use]
    pub fn tag<T: Tag>(mut self) -> Self {
        self.registry = self.registry.tag::<T>();
        self.table_makers.push(None);
        self
    }

    /// Choose how validation failures are reported (default:
    /// [`ErrorPolicy::Propagate`]).
    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Freeze the declared type set and build the manager.
    #[must_use]
    pub fn build(self) -> EntityManager {
        let registry = self.registry.build();
        let stores: Vec<_> = self
            .table_makers
            .into_iter()
            .map(|maker| maker.map(|make| make()))
            .collect();
        let indices = vec![BTreeSet::new(); registry.len()];
        debug!(
            declared = registry.len(),
            "built entity manager"
        );
        EntityManager {
            id: ManagerId::new(),
            registry,
            policy: self.policy,
            allocator: EntityAllocator::new(),
            directory: BTreeMap::new(),
            stores,
            indices,
        }
    }
}
