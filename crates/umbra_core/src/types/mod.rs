//! # Type Indexer & Proxy Dispatch
//!
//! Component data is plain bytes in a zone, so it cannot carry a vtable.
//! Instead every value type and every capability contract ("proxy") gets a
//! small integer id, and one compiled delegate per (type, proxy, method)
//! is stored in a single flat table:
//!
//! ```text
//! (TypeIndex, ProxyIndex) ──► DelegateIndex ──► table[first + ordinal]
//!                                                  │
//!                       zone bytes ──► &mut T ◄────┘  (bytemuck view)
//! ```
//!
//! The registry is an explicit object built once at startup and shared as
//! `Arc<TypeRegistry>`; there are no global tables.

mod indexed;
mod proxy;
mod registry;

pub use indexed::{IndexedType, TypeInfo};
pub use proxy::{Implements, Method, Proxy, ProxyInfo, ProxyPtr};
pub use registry::{ProxyRegistration, TypeRegistration, TypeRegistry, TypeRegistryBuilder};

/// Dense id of a registered value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub u16);

impl TypeIndex {
    /// Returns the index as a `usize` for table lookups.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Dense id of a registered proxy contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyIndex(pub u16);

impl ProxyIndex {
    /// Returns the index as a `usize` for table lookups.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Position of the first delegate of a (type, proxy) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegateIndex(pub u32);

impl DelegateIndex {
    /// Returns the index as a `usize` for table lookups.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}
