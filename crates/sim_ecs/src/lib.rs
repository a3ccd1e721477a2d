//! # sim_ecs
//!
//! The entity store — an in-process manager for entities that dynamically
//! acquire and lose typed components and value-less tags.
//!
//! This crate provides:
//!
//! - [`EntityManager`] — the façade owning the entity directory, one
//!   component table per declared type, and one attachment index per type.
//! - [`EntityHandle`] — value snapshots of entities, revalidated against
//!   the directory before every use.
//! - [`AttachmentSet`] / [`ComponentSet`] — tuple-based type sets for the
//!   query ([`EntityManager::get_entities`]) and iteration
//!   ([`EntityManager::for_each`]) engines.
//! - [`StoreError`] / [`ErrorPolicy`] — structured validation failures and
//!   the process-wide reporting policy.
//!
//! ## Usage
//!
//! ```rust
//! use sim_component::{Attachment, Component, Tag};
//! use sim_ecs::EntityManager;
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//! impl Attachment for Position {
//!     fn type_name() -> &'static str { "Position" }
//! }
//! impl Component for Position {}
//!
//! struct Frozen;
//! impl Attachment for Frozen {
//!     fn type_name() -> &'static str { "Frozen" }
//! }
//! impl Tag for Frozen {}
//!
//! let mut manager = EntityManager::builder()
//!     .component::<Position>()
//!     .tag::<Frozen>()
//!     .build();
//!
//! let mut player = manager.create_entity();
//! manager.add_component(&mut player, Position { x: 0.0, y: 0.0 })?;
//! manager.set_tag::<Frozen>(&mut player, true)?;
//!
//! manager.for_each::<(Position,), _>(|entity, (pos,)| {
//!     println!("{entity} is at ({}, {})", pos.x, pos.y);
//! });
//! # Ok::<(), sim_ecs::StoreError>(())
//! ```

pub mod error;
pub mod handle;
pub mod manager;
pub mod query;

pub use error::{BadEntityReason, ErrorPolicy, FatalHandler, StoreError};
pub use handle::{EntityHandle, ManagerId};
pub use manager::{EntityManager, EntityManagerBuilder};
pub use query::{AttachmentSet, ComponentCursor, ComponentSet};
