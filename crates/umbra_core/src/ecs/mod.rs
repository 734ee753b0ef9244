//! # Entity Runtime
//!
//! Entities, component storage and the kill/destroy cascade.
//!
//! ## Design Philosophy
//!
//! - Component arrays live in the allocator's zone, not on the Rust heap
//! - Entity handles are ids with generation counters and an allocator tag
//! - Teardown runs once per tick, so a whole dependency graph dies together

mod cascade;
mod component_set;
mod entity;
mod entity_state;
mod relations;
mod world;

pub use cascade::{
    Cascade, KillCallback, KillCallbackArgs, KillCommand, KillNotice, OnKill, TickContext,
    TickReport,
};
pub use component_set::{AnyComponentSet, ComponentSet, DestroyHandler};
pub use entity::Entity;
pub use entity_state::{DestroyListener, EntityStatePart};
pub use relations::{CallbackLink, ListArena, Relations};
pub use world::World;
