//! # Type Registry
//!
//! Built once, read forever. A [`TypeRegistryBuilder`] collects types and
//! (type, proxy) implementations, either explicitly or from the
//! [`register_indexed_type!`](crate::register_indexed_type) /
//! [`register_proxy_impl!`](crate::register_proxy_impl) submissions found by
//! [`TypeRegistryBuilder::scan`].

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::{error, info, trace};

use super::indexed::{IndexedType, TypeInfo};
use super::proxy::{Implements, Method, Proxy, ProxyInfo, ProxyPtr};
use super::{DelegateIndex, ProxyIndex, TypeIndex};
use crate::error::{CoreError, CoreResult};
use crate::memory::{MemPtr, MemZone};

/// One compiled proxy method: views the bytes as the concrete type and
/// downcasts the contract's arguments.
type Delegate = Box<dyn Fn(&mut [u8], &mut dyn Any) -> CoreResult<()> + Send + Sync>;

/// A type submitted for discovery by [`TypeRegistryBuilder::scan`].
pub struct TypeRegistration {
    name: &'static str,
    register: fn(&mut TypeRegistryBuilder) -> CoreResult<()>,
}

impl TypeRegistration {
    /// Describes `T`. Used by [`register_indexed_type!`](crate::register_indexed_type).
    #[must_use]
    pub const fn new<T: IndexedType>() -> Self {
        Self {
            name: T::NAME,
            register: register_type_entry::<T>,
        }
    }
}

/// A (type, proxy) implementation submitted for discovery.
pub struct ProxyRegistration {
    type_name: &'static str,
    proxy_name: &'static str,
    register: fn(&mut TypeRegistryBuilder) -> CoreResult<()>,
}

impl ProxyRegistration {
    /// Describes `T` implementing `P`. Used by
    /// [`register_proxy_impl!`](crate::register_proxy_impl).
    #[must_use]
    pub const fn new<T: Implements<P>, P: Proxy>() -> Self {
        Self {
            type_name: T::NAME,
            proxy_name: P::NAME,
            register: register_proxy_entry::<T, P>,
        }
    }
}

inventory::collect!(TypeRegistration);
inventory::collect!(ProxyRegistration);

fn register_type_entry<T: IndexedType>(builder: &mut TypeRegistryBuilder) -> CoreResult<()> {
    builder.register_type::<T>().map(|_| ())
}

fn register_proxy_entry<T: Implements<P>, P: Proxy>(
    builder: &mut TypeRegistryBuilder,
) -> CoreResult<()> {
    builder.register_proxy::<T, P>().map(|_| ())
}

/// Submits a type for [`TypeRegistryBuilder::scan`].
///
/// ```rust,ignore
/// umbra_core::register_indexed_type!(Health, Armor);
/// ```
#[macro_export]
macro_rules! register_indexed_type {
    ($($ty:ty),+ $(,)?) => {
        $(
            $crate::__private::inventory::submit! {
                $crate::types::TypeRegistration::new::<$ty>()
            }
        )+
    };
}

/// Submits a (type, proxy) implementation for [`TypeRegistryBuilder::scan`].
///
/// ```rust,ignore
/// umbra_core::register_proxy_impl!(ScoreOnDeath => KillCallback);
/// ```
#[macro_export]
macro_rules! register_proxy_impl {
    ($ty:ty => $proxy:ty) => {
        $crate::__private::inventory::submit! {
            $crate::types::ProxyRegistration::new::<$ty, $proxy>()
        }
    };
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable type and delegate tables.
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    type_lookup: HashMap<TypeId, TypeIndex>,
    proxies: Vec<ProxyInfo>,
    proxy_lookup: HashMap<TypeId, ProxyIndex>,
    delegates: Vec<Delegate>,
    first_delegate: HashMap<(TypeIndex, ProxyIndex), DelegateIndex>,
}

impl TypeRegistry {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// Returns the index of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotRegistered`] if `T` was never registered.
    pub fn type_index<T: IndexedType>(&self) -> CoreResult<TypeIndex> {
        self.type_lookup
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(CoreError::TypeNotRegistered(T::NAME))
    }

    /// Returns the index of `P`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ProxyNotRegistered`] if no type implements `P`.
    pub fn proxy_index<P: Proxy>(&self) -> CoreResult<ProxyIndex> {
        self.proxy_lookup
            .get(&TypeId::of::<P>())
            .copied()
            .ok_or(CoreError::ProxyNotRegistered(P::NAME))
    }

    /// Returns the first delegate of a (type, proxy) pair.
    #[must_use]
    pub fn delegate_index(&self, type_index: TypeIndex, proxy: ProxyIndex) -> Option<DelegateIndex> {
        self.first_delegate.get(&(type_index, proxy)).copied()
    }

    /// Returns `true` if the type implements the proxy.
    #[must_use]
    pub fn implements(&self, type_index: TypeIndex, proxy: ProxyIndex) -> bool {
        self.first_delegate.contains_key(&(type_index, proxy))
    }

    /// Returns metadata for a type.
    #[must_use]
    pub fn type_info(&self, index: TypeIndex) -> Option<&TypeInfo> {
        self.types.get(index.as_usize())
    }

    /// Returns metadata for a proxy.
    #[must_use]
    pub fn proxy_info(&self, index: ProxyIndex) -> Option<&ProxyInfo> {
        self.proxies.get(index.as_usize())
    }

    /// Number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of registered proxies.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Length of the delegate table.
    #[must_use]
    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    /// Builds a proxy pointer for a block holding a `T`.
    ///
    /// # Errors
    ///
    /// Fails if `T`, `P` or the pair is not registered.
    pub fn proxy_ptr<T: IndexedType, P: Proxy>(&self, data: MemPtr) -> CoreResult<ProxyPtr> {
        let type_index = self.type_index::<T>()?;
        let proxy_index = self.proxy_index::<P>()?;
        if !self.implements(type_index, proxy_index) {
            return Err(CoreError::ProxyNotFound {
                type_index: type_index.0,
                proxy_index: proxy_index.0,
            });
        }
        Ok(ProxyPtr {
            data,
            type_index: type_index.0,
            proxy_index: proxy_index.0,
        })
    }

    /// Calls method `ordinal` of contract `P` on the value behind `ptr`.
    ///
    /// The bytes are re-resolved from the zone on every call, so the zone
    /// may have grown since the pointer was created.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ProxyMismatch`] if `ptr` was built for another contract
    /// - [`CoreError::MethodOutOfRange`] if `ordinal >= P::METHOD_COUNT`
    /// - [`CoreError::ProxyNotFound`] if the type does not implement `P`
    /// - any resolve error for the data handle
    pub fn invoke<P: Proxy>(
        &self,
        zone: &mut MemZone,
        ptr: ProxyPtr,
        ordinal: usize,
        args: &mut P::Args,
    ) -> CoreResult<()> {
        let proxy = self.proxy_index::<P>()?;
        if ptr.proxy_index != proxy.0 {
            let found = self
                .proxy_info(ProxyIndex(ptr.proxy_index))
                .map_or("<unknown>", |info| info.name);
            return Err(CoreError::ProxyMismatch {
                expected: P::NAME,
                found,
            });
        }
        if ordinal >= P::METHOD_COUNT {
            return Err(CoreError::MethodOutOfRange {
                proxy: P::NAME,
                ordinal,
                count: P::METHOD_COUNT,
            });
        }
        let type_index = TypeIndex(ptr.type_index);
        let first = self
            .delegate_index(type_index, proxy)
            .ok_or(CoreError::ProxyNotFound {
                type_index: ptr.type_index,
                proxy_index: ptr.proxy_index,
            })?;
        let size = self
            .type_info(type_index)
            .map(|info| info.size)
            .ok_or(CoreError::ProxyNotFound {
                type_index: ptr.type_index,
                proxy_index: ptr.proxy_index,
            })?;

        let bytes = zone.bytes_mut(ptr.data, size)?;
        let delegate = &self.delegates[first.as_usize() + ordinal];
        delegate(bytes, args)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.iter().map(|t| t.name).collect::<Vec<_>>())
            .field("proxies", &self.proxies.iter().map(|p| p.name).collect::<Vec<_>>())
            .field("delegates", &self.delegates.len())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Accumulates registrations, then freezes them into a [`TypeRegistry`].
#[derive(Default)]
pub struct TypeRegistryBuilder {
    inner: TypeRegistry,
}

impl TypeRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, returning its index. Registering twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedLayout`] if `T` cannot live in a zone.
    pub fn register_type<T: IndexedType>(&mut self) -> CoreResult<TypeIndex> {
        if let Some(&index) = self.inner.type_lookup.get(&TypeId::of::<T>()) {
            return Ok(index);
        }
        let raw = u16::try_from(self.inner.types.len())
            .map_err(|_| CoreError::InvalidConfig("too many indexed types".to_string()))?;
        let index = TypeIndex(raw);
        let info = TypeInfo::of::<T>(index)?;
        self.inner.types.push(info);
        self.inner.type_lookup.insert(info.type_id, index);
        trace!(type_name = T::NAME, index = raw, "type registered");
        Ok(index)
    }

    /// Registers `T`'s implementation of `P` and compiles its delegates.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateProxy`] if the pair is already registered
    /// - [`CoreError::MethodCountMismatch`] if `T::methods()` has the wrong length
    /// - layout errors from [`TypeRegistryBuilder::register_type`]
    pub fn register_proxy<T: Implements<P>, P: Proxy>(&mut self) -> CoreResult<DelegateIndex> {
        let type_index = self.register_type::<T>()?;
        let proxy_index = self.register_contract::<P>()?;
        if self.inner.implements(type_index, proxy_index) {
            error!(
                type_name = T::NAME,
                proxy = P::NAME,
                "duplicate proxy registration"
            );
            return Err(CoreError::DuplicateProxy {
                type_name: T::NAME,
                proxy: P::NAME,
            });
        }

        let methods = T::methods();
        if methods.len() != P::METHOD_COUNT {
            return Err(CoreError::MethodCountMismatch {
                type_name: T::NAME,
                proxy: P::NAME,
                expected: P::METHOD_COUNT,
                found: methods.len(),
            });
        }

        let first = u32::try_from(self.inner.delegates.len())
            .map(DelegateIndex)
            .map_err(|_| CoreError::InvalidConfig("delegate table overflow".to_string()))?;
        self.inner
            .delegates
            .extend(methods.into_iter().map(compile_delegate::<T, P>));
        self.inner
            .first_delegate
            .insert((type_index, proxy_index), first);
        trace!(
            type_name = T::NAME,
            proxy = P::NAME,
            first = first.0,
            "proxy registered"
        );
        Ok(first)
    }

    /// Registers every submission made with the registration macros.
    ///
    /// Types are registered first, sorted by name, then implementations
    /// sorted by (proxy, type), so indices do not depend on link order.
    ///
    /// # Errors
    ///
    /// Propagates the first registration error. Scanning twice, or scanning
    /// after registering a submitted pair by hand, reports `DuplicateProxy`.
    pub fn scan(&mut self) -> CoreResult<&mut Self> {
        let mut types: Vec<&TypeRegistration> =
            inventory::iter::<TypeRegistration>.into_iter().collect();
        types.sort_by_key(|r| r.name);
        for registration in types {
            (registration.register)(self)?;
        }

        let mut proxies: Vec<&ProxyRegistration> =
            inventory::iter::<ProxyRegistration>.into_iter().collect();
        proxies.sort_by_key(|r| (r.proxy_name, r.type_name));
        for registration in proxies {
            (registration.register)(self)?;
        }
        Ok(self)
    }

    /// Freezes the tables.
    #[must_use]
    pub fn build(self) -> TypeRegistry {
        info!(
            types = self.inner.types.len(),
            proxies = self.inner.proxies.len(),
            delegates = self.inner.delegates.len(),
            "type registry built"
        );
        self.inner
    }

    fn register_contract<P: Proxy>(&mut self) -> CoreResult<ProxyIndex> {
        if let Some(&index) = self.inner.proxy_lookup.get(&TypeId::of::<P>()) {
            return Ok(index);
        }
        let raw = u16::try_from(self.inner.proxies.len())
            .map_err(|_| CoreError::InvalidConfig("too many proxy contracts".to_string()))?;
        let index = ProxyIndex(raw);
        self.inner.proxies.push(ProxyInfo::of::<P>());
        self.inner.proxy_lookup.insert(TypeId::of::<P>(), index);
        Ok(index)
    }
}

fn compile_delegate<T: Implements<P>, P: Proxy>(method: Method<T, P>) -> Delegate {
    Box::new(move |bytes: &mut [u8], args: &mut dyn Any| {
        let value: &mut T = bytemuck::try_from_bytes_mut(bytes)?;
        let args = args
            .downcast_mut::<P::Args>()
            .ok_or(CoreError::ProxyMismatch {
                expected: P::NAME,
                found: "<foreign arguments>",
            })?;
        method(value, args);
        Ok(())
    })
}
