//! The declared-type registry.
//!
//! An [`AttachmentRegistry`] is the closed list of component and tag types a
//! store is configured for. It is built once, before the store exists, and
//! is immutable afterwards: every declared type gets a dense slot index, and
//! the registry fixes the width of every [`AttachmentMask`] the store will
//! ever create.

use std::collections::HashMap;

use crate::attachment::{Attachment, AttachmentTypeId, Component, Tag};
use crate::mask::AttachmentMask;

/// Whether a declared attachment type carries a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Data-bearing: the store keeps one value per attached entity.
    Component,
    /// Value-less: only the mask bit and index membership exist.
    Tag,
}

/// One declared attachment type.
#[derive(Debug, Clone)]
struct SlotInfo {
    type_id: AttachmentTypeId,
    name: &'static str,
    kind: AttachmentKind,
}

/// The closed set of attachment types a store is declared over.
///
/// Slots are assigned in declaration order, starting at 0. Lookup from
/// [`AttachmentTypeId`] to slot is O(1).
#[derive(Debug, Clone)]
pub struct AttachmentRegistry {
    slots: Vec<SlotInfo>,
    by_id: HashMap<AttachmentTypeId, usize>,
}

impl AttachmentRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            slots: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Number of declared attachment types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no types are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slot index for a type ID, if declared.
    #[must_use]
    pub fn slot_of(&self, type_id: AttachmentTypeId) -> Option<usize> {
        self.by_id.get(&type_id).copied()
    }

    /// Returns the kind of the type in `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn kind(&self, slot: usize) -> AttachmentKind {
        self.slots[slot].kind
    }

    /// Returns the declared name of the type in `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn name(&self, slot: usize) -> &'static str {
        self.slots[slot].name
    }

    /// Returns the type ID of the type in `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn type_id(&self, slot: usize) -> AttachmentTypeId {
        self.slots[slot].type_id
    }

    /// Create an all-zero mask sized for this registry.
    #[must_use]
    pub fn empty_mask(&self) -> AttachmentMask {
        AttachmentMask::zeroed(self.slots.len())
    }
}

/// Builder for [`AttachmentRegistry`].
///
/// Declaring the same type (or two types with the same name) twice is a
/// contract error and panics.
#[derive(Debug)]
pub struct RegistryBuilder {
    slots: Vec<SlotInfo>,
    by_id: HashMap<AttachmentTypeId, usize>,
}

impl RegistryBuilder {
    /// Declare a component type.
    #[must_use]
    pub fn component<T: Component>(mut self) -> Self {
        self.declare::<T>(AttachmentKind::Component);
        self
    }

    /// Declare a tag type.
    #[must_use]
    pub fn tag<T: Tag>(mut self) -> Self {
        self.declare::<T>(AttachmentKind::Tag);
        self
    }

    fn declare<A: Attachment>(&mut self, kind: AttachmentKind) {
        let type_id = A::attachment_type_id();
        let name = A::type_name();
        assert!(
            !self.by_id.contains_key(&type_id),
            "attachment type `{name}` declared twice"
        );
        let slot = self.slots.len();
        self.slots.push(SlotInfo {
            type_id,
            name,
            kind,
        });
        self.by_id.insert(type_id, slot);
    }

    /// Finish the declaration and freeze the type set.
    #[must_use]
    pub fn build(self) -> AttachmentRegistry {
        AttachmentRegistry {
            slots: self.slots,
            by_id: self.by_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Attachment for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }
    impl Component for Position {}

    #[derive(Debug, Clone, Copy)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Attachment for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }
    impl Component for Velocity {}

    struct Frozen;
    impl Attachment for Frozen {
        fn type_name() -> &'static str {
            "Frozen"
        }
    }
    impl Tag for Frozen {}

    fn make_registry() -> AttachmentRegistry {
        AttachmentRegistry::builder()
            .component::<Position>()
            .component::<Velocity>()
            .tag::<Frozen>()
            .build()
    }

    #[test]
    fn test_slots_assigned_in_declaration_order() {
        let registry = make_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.slot_of(Position::attachment_type_id()), Some(0));
        assert_eq!(registry.slot_of(Velocity::attachment_type_id()), Some(1));
        assert_eq!(registry.slot_of(Frozen::attachment_type_id()), Some(2));
    }

    #[test]
    fn test_kind_and_name_per_slot() {
        let registry = make_registry();
        assert_eq!(registry.kind(0), AttachmentKind::Component);
        assert_eq!(registry.kind(2), AttachmentKind::Tag);
        assert_eq!(registry.name(1), "Velocity");
    }

    #[test]
    fn test_undeclared_type_has_no_slot() {
        let registry = AttachmentRegistry::builder().component::<Position>().build();
        assert_eq!(registry.slot_of(Velocity::attachment_type_id()), None);
    }

    #[test]
    fn test_empty_mask_width_matches_declarations() {
        let registry = make_registry();
        let mask = registry.empty_mask();
        assert!(mask.is_empty());
        assert!(mask.capacity() >= registry.len());
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn test_duplicate_declaration_panics() {
        let _ = AttachmentRegistry::builder()
            .component::<Position>()
            .component::<Position>();
    }
}
