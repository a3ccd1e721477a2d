//! The query and iteration engines.
//!
//! Both engines share one plan: resolve the requested types to registry
//! slots (rejecting duplicates and undeclared types before any per-entity
//! work), pick the requested type whose attachment index currently has the
//! fewest members, and walk that index in ID order, keeping every entity
//! whose directory mask is a superset of the target mask. This bounds the
//! scan to the smallest candidate set instead of the whole population.
//!
//! [`EntityManager::for_each`] additionally carries one forward-only
//! [`ComponentCursor`] per requested component type. Because every
//! container involved is ordered by ascending entity ID, each cursor only
//! ever moves forward — a single linear merge instead of one lookup per
//! (entity, component) pair.

use std::collections::btree_map;

use sim_component::{Attachment, AttachmentMask, AttachmentTypeId, Component, Entity};

use crate::handle::EntityHandle;
use crate::manager::{ComponentTable, EntityManager};

/// A set of requested attachment types (components or tags), used to filter
/// entities without yielding any data.
///
/// Implemented for the unit type (the empty set — matches every entity) and
/// for tuples of up to eight [`Attachment`] types.
pub trait AttachmentSet {
    /// The requested type IDs with their declared names, in request order.
    fn attachment_types() -> Vec<(AttachmentTypeId, &'static str)>;
}

impl AttachmentSet for () {
    fn attachment_types() -> Vec<(AttachmentTypeId, &'static str)> {
        Vec::new()
    }
}

macro_rules! impl_attachment_set {
    ($($A:ident),+) => {
        impl<$($A: Attachment),+> AttachmentSet for ($($A,)+) {
            fn attachment_types() -> Vec<(AttachmentTypeId, &'static str)> {
                vec![$(($A::attachment_type_id(), $A::type_name())),+]
            }
        }
    };
}

impl_attachment_set!(A);
impl_attachment_set!(A, B);
impl_attachment_set!(A, B, C);
impl_attachment_set!(A, B, C, D);
impl_attachment_set!(A, B, C, D, E);
impl_attachment_set!(A, B, C, D, E, F);
impl_attachment_set!(A, B, C, D, E, F, G);
impl_attachment_set!(A, B, C, D, E, F, G, H);

/// A forward-only cursor over one component table.
///
/// Valid only because the table is ordered by ascending entity ID and the
/// candidate entities handed to [`advance_to`](Self::advance_to) are an
/// ascending subset of the table's keys.
pub struct ComponentCursor<'a, T: Component> {
    iter: btree_map::Iter<'a, Entity, T>,
}

impl<'a, T: Component> ComponentCursor<'a, T> {
    fn new(table: &'a ComponentTable<T>) -> Self {
        Self {
            iter: table.rows.iter(),
        }
    }

    /// Move the cursor forward to `entity` and return its value.
    ///
    /// # Panics
    ///
    /// Panics if the table holds no row for `entity` — the attachment index
    /// and the component table disagree, which is an internal invariant
    /// violation.
    fn advance_to(&mut self, entity: Entity) -> &'a T {
        loop {
            let Some((&at, value)) = self.iter.next() else {
                panic!(
                    "component table `{}` has no row for {entity}; table and index disagree",
                    T::type_name()
                );
            };
            if at == entity {
                return value;
            }
            debug_assert!(
                at < entity,
                "component table `{}` passed {entity} without a row",
                T::type_name()
            );
        }
    }
}

/// A set of requested component types whose values are handed to an
/// iteration callback, one shared reference per type.
///
/// Implemented for the unit type (no data, no filtering) and for tuples of
/// up to eight [`Component`] types. The callback's argument tuple and the
/// requested set are the same type parameter, so a signature mismatch is a
/// compile error.
pub trait ComponentSet {
    /// One shared reference per requested component type.
    type Refs<'a>;
    /// Iteration state: one forward-only cursor per requested type.
    type Cursors<'a>;

    /// The requested type IDs with their declared names, in request order.
    fn component_types() -> Vec<(AttachmentTypeId, &'static str)>;

    /// Open one cursor per requested type at the start of its table.
    fn cursors(manager: &EntityManager) -> Self::Cursors<'_>;

    /// Advance every cursor to `entity` and collect the references.
    fn advance<'a>(cursors: &mut Self::Cursors<'a>, entity: Entity) -> Self::Refs<'a>;
}

impl ComponentSet for () {
    type Refs<'a> = ();
    type Cursors<'a> = ();

    fn component_types() -> Vec<(AttachmentTypeId, &'static str)> {
        Vec::new()
    }

    fn cursors(_manager: &EntityManager) -> Self::Cursors<'_> {}

    fn advance<'a>(_cursors: &mut Self::Cursors<'a>, _entity: Entity) -> Self::Refs<'a> {}
}

macro_rules! impl_component_set {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentSet for ($($T,)+) {
            type Refs<'a> = ($(&'a $T,)+);
            type Cursors<'a> = ($(ComponentCursor<'a, $T>,)+);

            fn component_types() -> Vec<(AttachmentTypeId, &'static str)> {
                vec![$(($T::attachment_type_id(), $T::type_name())),+]
            }

            fn cursors(manager: &EntityManager) -> Self::Cursors<'_> {
                ($(ComponentCursor::<$T>::new(manager.table::<$T>()),)+)
            }

            #[allow(non_snake_case)]
            fn advance<'a>(cursors: &mut Self::Cursors<'a>, entity: Entity) -> Self::Refs<'a> {
                let ($($T,)+) = cursors;
                ($($T.advance_to(entity),)+)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

impl EntityManager {
    /// Return a handle for every live entity holding all of `S`'s types,
    /// in ascending ID order.
    ///
    /// `S = ()` returns every live entity. Returned handles carry the
    /// entities' current versions.
    ///
    /// # Panics
    ///
    /// Panics if `S` contains a duplicate or undeclared type — a contract
    /// error, rejected before any per-entity work.
    #[must_use]
    pub fn get_entities<S: AttachmentSet>(&self) -> Vec<EntityHandle> {
        let slots = self.resolve_slots(&S::attachment_types());
        if slots.is_empty() {
            return self
                .directory
                .iter()
                .map(|(&entity, record)| EntityHandle::new(entity, self.id, record.version))
                .collect();
        }

        let target = self.target_mask(&slots);
        let pivot = self.smallest_index(&slots);
        self.indices[pivot]
            .iter()
            .filter_map(|&entity| {
                let record = self
                    .directory
                    .get(&entity)
                    .expect("attachment index lists an entity missing from the directory");
                record
                    .mask
                    .contains_all(&target)
                    .then(|| EntityHandle::new(entity, self.id, record.version))
            })
            .collect()
    }

    /// Invoke `f` once per entity holding all of `Q`'s component types, in
    /// ascending ID order, passing one shared reference per requested type.
    ///
    /// Shorthand for [`for_each_filtered`](Self::for_each_filtered) with an
    /// empty filter set.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a duplicate or undeclared type.
    pub fn for_each<Q, F>(&self, f: F)
    where
        Q: ComponentSet,
        F: FnMut(&EntityHandle, Q::Refs<'_>),
    {
        self.for_each_filtered::<Q, (), F>(f);
    }

    /// Invoke `f` once per entity holding all of `Q`'s component types AND
    /// all of `W`'s filter types, in ascending ID order.
    ///
    /// Filter types (tags or components) narrow the candidate set but
    /// contribute no callback argument. The walk holds `&self`, so the
    /// store cannot be structurally mutated from inside the callback.
    ///
    /// # Panics
    ///
    /// Panics if the combined `Q` + `W` set contains a duplicate or
    /// undeclared type — rejected before iteration begins.
    pub fn for_each_filtered<Q, W, F>(&self, mut f: F)
    where
        Q: ComponentSet,
        W: AttachmentSet,
        F: FnMut(&EntityHandle, Q::Refs<'_>),
    {
        let mut requested = Q::component_types();
        requested.extend(W::attachment_types());
        let slots = self.resolve_slots(&requested);
        let mut cursors = Q::cursors(self);

        if slots.is_empty() {
            for (&entity, record) in &self.directory {
                let handle = EntityHandle::new(entity, self.id, record.version);
                f(&handle, Q::advance(&mut cursors, entity));
            }
            return;
        }

        let target = self.target_mask(&slots);
        let pivot = self.smallest_index(&slots);
        for &entity in &self.indices[pivot] {
            let record = self
                .directory
                .get(&entity)
                .expect("attachment index lists an entity missing from the directory");
            if !record.mask.contains_all(&target) {
                continue;
            }
            let handle = EntityHandle::new(entity, self.id, record.version);
            f(&handle, Q::advance(&mut cursors, entity));
        }
    }

    /// Map requested types to registry slots, rejecting duplicates and
    /// undeclared types.
    fn resolve_slots(&self, requested: &[(AttachmentTypeId, &'static str)]) -> Vec<usize> {
        let mut slots = Vec::with_capacity(requested.len());
        for &(type_id, name) in requested {
            let slot = self.registry().slot_of(type_id).unwrap_or_else(|| {
                panic!("attachment type `{name}` is not declared for this manager")
            });
            assert!(
                !slots.contains(&slot),
                "attachment type `{name}` requested twice in one query"
            );
            slots.push(slot);
        }
        slots
    }

    /// The mask with every requested slot's bit set.
    fn target_mask(&self, slots: &[usize]) -> AttachmentMask {
        let mut mask = self.registry().empty_mask();
        for &slot in slots {
            mask.set(slot);
        }
        mask
    }

    /// The requested slot whose attachment index has the fewest members.
    fn smallest_index(&self, slots: &[usize]) -> usize {
        slots
            .iter()
            .copied()
            .min_by_key(|&slot| self.indices[slot].len())
            .expect("at least one slot was requested")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_component::Tag;

    #[derive(Debug, Clone, Copy, PartialEq)]
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

    #[derive(Debug, Clone, Copy, PartialEq)]
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

    struct Selected;
    impl Attachment for Selected {
        fn type_name() -> &'static str {
            "Selected"
        }
    }
    impl Tag for Selected {}

    /// 24 entities: every 2nd gets a Position, every 3rd a Velocity, every
    /// 4th the Frozen tag. `Selected` is declared but never set.
    fn populated() -> (EntityManager, Vec<EntityHandle>) {
        let mut m = EntityManager::builder()
            .component::<Position>()
            .component::<Velocity>()
            .tag::<Frozen>()
            .tag::<Selected>()
            .build();

        let mut handles = Vec::new();
        for i in 0..24u32 {
            let mut h = m.create_entity();
            if i % 2 == 0 {
                m.add_component(&mut h, Position { x: i as f32, y: 0.0 }).unwrap();
            }
            if i % 3 == 0 {
                m.add_component(&mut h, Velocity { dx: i as f32, dy: 1.0 }).unwrap();
            }
            if i % 4 == 0 {
                m.set_tag::<Frozen>(&mut h, true).unwrap();
            }
            handles.push(h);
        }
        (m, handles)
    }

    fn ids(handles: &[EntityHandle]) -> Vec<Entity> {
        handles.iter().map(EntityHandle::entity).collect()
    }

    fn is_sorted(entities: &[Entity]) -> bool {
        entities.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_empty_type_set_returns_all_entities() {
        let (m, handles) = populated();
        let all = m.get_entities::<()>();
        assert_eq!(ids(&all), ids(&handles));
        assert!(is_sorted(&ids(&all)));
    }

    #[test]
    fn test_query_matches_brute_force() {
        let (m, handles) = populated();

        // Brute force: every 2nd AND every 3rd → every 6th.
        let expected: Vec<Entity> = handles
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0 && i % 3 == 0)
            .map(|(_, h)| h.entity())
            .collect();

        let got = m.get_entities::<(Position, Velocity)>();
        assert_eq!(ids(&got), expected);
        assert!(is_sorted(&ids(&got)));
    }

    #[test]
    fn test_query_mixes_components_and_tags() {
        let (m, handles) = populated();

        // Every 4th entity is Frozen, and every 4th also has a Position.
        let expected: Vec<Entity> = handles
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 4 == 0)
            .map(|(_, h)| h.entity())
            .collect();

        let got = m.get_entities::<(Position, Frozen)>();
        assert_eq!(ids(&got), expected);
    }

    #[test]
    fn test_query_with_no_matches_is_empty() {
        let (m, _) = populated();
        assert!(m.get_entities::<(Selected,)>().is_empty());
        assert!(m.get_entities::<(Velocity, Selected)>().is_empty());
    }

    #[test]
    fn test_query_handles_are_usable() {
        let (m, _) = populated();
        for h in m.get_entities::<(Position,)>() {
            // Fresh version snapshots — the handle validates.
            assert!(m.get_component::<Position>(&h).is_ok());
        }
    }

    #[test]
    fn test_for_each_visits_query_results_in_order() {
        let (m, _) = populated();

        let expected: Vec<Entity> = ids(&m.get_entities::<(Position, Velocity)>());
        let mut seen = Vec::new();
        m.for_each::<(Position, Velocity), _>(|h, (pos, vel)| {
            // Both components were seeded from the creation index.
            assert_eq!(pos.x, vel.dx);
            seen.push(h.entity());
        });
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_for_each_passes_current_values() {
        let (mut m, mut handles) = populated();

        // Mutate one matching entity's Position through the accessor.
        let target = &mut handles[6];
        m.get_component_mut::<Position>(target).unwrap().y = 42.0;

        let mut seen_y = None;
        let target_entity = target.entity();
        m.for_each::<(Position,), _>(|h, (pos,)| {
            if h.entity() == target_entity {
                seen_y = Some(pos.y);
            }
        });
        assert_eq!(seen_y, Some(42.0));
    }

    #[test]
    fn test_for_each_empty_set_walks_the_directory() {
        let (m, handles) = populated();
        let mut seen = Vec::new();
        m.for_each::<(), _>(|h, ()| seen.push(h.entity()));
        assert_eq!(seen, ids(&handles));
    }

    #[test]
    fn test_for_each_filtered_by_tag() {
        let (m, handles) = populated();

        // Position holders that are also Frozen: every 4th entity.
        let expected: Vec<Entity> = handles
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 4 == 0)
            .map(|(_, h)| h.entity())
            .collect();

        let mut seen = Vec::new();
        m.for_each_filtered::<(Position,), (Frozen,), _>(|h, (pos,)| {
            assert_eq!(pos.y, 0.0);
            seen.push(h.entity());
        });
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_for_each_agrees_with_get_entities() {
        let (m, _) = populated();
        let mut visited = 0usize;
        m.for_each::<(Velocity,), _>(|_, _| visited += 1);
        assert_eq!(visited, m.get_entities::<(Velocity,)>().len());
        assert_eq!(visited, m.attachment_count::<Velocity>());
    }

    #[test]
    #[should_panic(expected = "requested twice")]
    fn test_duplicate_type_in_query_panics() {
        let (m, _) = populated();
        let _ = m.get_entities::<(Position, Position)>();
    }

    #[test]
    #[should_panic(expected = "is not declared for this manager")]
    fn test_undeclared_type_in_query_panics() {
        struct Ghost;
        impl Attachment for Ghost {
            fn type_name() -> &'static str {
                "Ghost"
            }
        }
        impl Component for Ghost {}

        let (m, _) = populated();
        let _ = m.get_entities::<(Ghost,)>();
    }

    #[test]
    fn test_queries_on_empty_manager() {
        let m = EntityManager::builder()
            .component::<Position>()
            .tag::<Frozen>()
            .build();
        assert!(m.get_entities::<()>().is_empty());
        assert!(m.get_entities::<(Position,)>().is_empty());
        let mut called = false;
        m.for_each::<(Position,), _>(|_, _| called = true);
        assert!(!called);
    }
}
