//! Value types that may live in a zone.

use std::any::TypeId;

use bytemuck::Pod;

use super::TypeIndex;
use crate::error::{CoreError, CoreResult};
use crate::memory::MAX_VALUE_ALIGN;

/// A plain-data value type with a stable registry name.
///
/// Implementors are `Pod`, so a zone block can be viewed as one without
/// any unsafe code. Zero-sized types and types aligned above
/// [`MAX_VALUE_ALIGN`] are rejected at registration.
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health { current: f32, max: f32 }
///
/// impl IndexedType for Health {
///     const NAME: &'static str = "Health";
/// }
/// ```
pub trait IndexedType: Pod + Default + Send + Sync + 'static {
    /// Registry name. Scans sort by it, so it decides the type's index.
    const NAME: &'static str;
}

/// Layout and identity of a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    /// Registry name.
    pub name: &'static str,
    /// `size_of::<T>()`.
    pub size: usize,
    /// `align_of::<T>()`.
    pub align: usize,
    /// Rust type id.
    pub type_id: TypeId,
    /// Assigned index.
    pub index: TypeIndex,
}

impl TypeInfo {
    /// Describes `T`, checking that it can live in a zone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedLayout`] for zero-sized or
    /// over-aligned types.
    pub fn of<T: IndexedType>(index: TypeIndex) -> CoreResult<Self> {
        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        if size == 0 || align > MAX_VALUE_ALIGN {
            return Err(CoreError::UnsupportedLayout {
                type_name: T::NAME,
                size,
                align,
            });
        }
        Ok(Self {
            name: T::NAME,
            size,
            align,
            type_id: TypeId::of::<T>(),
            index,
        })
    }
}
