//! Proxy contracts and proxy pointers.

use std::any::TypeId;

use bytemuck::{Pod, Zeroable};

use super::indexed::IndexedType;
use crate::memory::MemPtr;

/// A capability contract: a fixed list of methods over one argument type.
///
/// Methods are addressed by ordinal, `0..METHOD_COUNT`.
pub trait Proxy: 'static {
    /// Registry name.
    const NAME: &'static str;
    /// Number of methods every implementation must supply.
    const METHOD_COUNT: usize;
    /// Argument passed to every method.
    type Args: 'static;
}

/// A proxy method bound to a concrete type.
pub type Method<T, P> = fn(&mut T, &mut <P as Proxy>::Args);

/// A concrete type's implementation of a proxy contract.
pub trait Implements<P: Proxy>: IndexedType {
    /// Methods in ordinal order; length must equal `P::METHOD_COUNT`.
    fn methods() -> Vec<Method<Self, P>>;
}

/// Registry metadata for a proxy contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyInfo {
    /// Registry name.
    pub name: &'static str,
    /// Methods in the contract.
    pub method_count: usize,
    /// Rust type id of the contract marker.
    pub type_id: TypeId,
}

impl ProxyInfo {
    /// Describes `P`.
    #[must_use]
    pub fn of<P: Proxy>() -> Self {
        Self {
            name: P::NAME,
            method_count: P::METHOD_COUNT,
            type_id: TypeId::of::<P>(),
        }
    }
}

/// A zone block viewed through a proxy contract.
///
/// Plain data, so it can itself be stored in the zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct ProxyPtr {
    /// The block holding the value.
    pub data: MemPtr,
    /// Concrete type of the value.
    pub type_index: u16,
    /// Contract the pointer dispatches through.
    pub proxy_index: u16,
}

impl ProxyPtr {
    /// The null proxy pointer.
    pub const NULL: Self = Self {
        data: MemPtr::NULL,
        type_index: 0,
        proxy_index: 0,
    };

    /// Returns `true` if the data handle is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.data.is_null()
    }
}
