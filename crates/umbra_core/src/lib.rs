//! # UMBRA Core Runtime
//!
//! Unmanaged entity runtime designed for:
//! - Component data stored in a relocatable zone, addressed by offset
//! - Behavior attached to plain-data values through integer-indexed proxies
//! - Whole dependency graphs torn down in a single tick
//!
//! ## Architecture Rules
//!
//! 1. **No pointers into the zone survive a call** - handles are offsets
//! 2. **Data-oriented design** - components are stored in dense arrays
//! 3. **Explicit registry** - type and proxy tables are built once and shared
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use umbra_core::{RuntimeConfig, TypeRegistry, World};
//!
//! let mut builder = TypeRegistry::builder();
//! builder.scan()?;
//! let mut world = World::new(Arc::new(builder.build()), RuntimeConfig::default())?;
//!
//! let parent = world.create_entity()?;
//! let child = world.create_entity()?;
//! world.add_child(parent, child)?;
//!
//! world.request_kill(parent);
//! world.tick(1.0 / 60.0)?;
//! assert!(!world.is_alive(child));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod sync;
pub mod types;

pub use config::RuntimeConfig;
pub use ecs::{
    AnyComponentSet, Cascade, ComponentSet, DestroyHandler, Entity, EntityStatePart,
    KillCallback, KillCallbackArgs, KillCommand, KillNotice, OnKill, TickReport, World,
};
pub use error::{CoreError, CoreResult};
pub use memory::{Allocator, AllocatorId, LocalService, LocalServices, MemPtr, MemZone};
pub use types::{
    Implements, IndexedType, Method, Proxy, ProxyPtr, TypeIndex, TypeRegistry,
    TypeRegistryBuilder,
};

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
