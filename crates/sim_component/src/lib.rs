//! # sim_component
//!
//! Primitives for the entity store — identity and type declarations, with no
//! storage of their own.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u64` entity identifiers, ordered by ID.
//! - [`EntityAllocator`] — monotonically increasing, never-reusing ID allocator.
//! - [`Attachment`] / [`Component`] / [`Tag`] — the traits attachable types
//!   implement, with FNV-1a-derived [`AttachmentTypeId`]s.
//! - [`AttachmentMask`] — fixed-width per-entity bit-vector of held types.
//! - [`AttachmentRegistry`] — the closed, slot-indexed set of declared types.

pub mod attachment;
pub mod entity;
pub mod mask;
pub mod registry;

pub use attachment::{Attachment, AttachmentTypeId, Component, Tag};
pub use entity::{Entity, EntityAllocator};
pub use mask::AttachmentMask;
pub use registry::{AttachmentKind, AttachmentRegistry, RegistryBuilder};
