//! [`PrimitiveArray`] that stores fixed byte-width data

use super::{
    push_validity, truncate_validity, Array, ArrayImpl, InvalidLogicalTypeSnafu, Result,
};
use crate::cow::CowPtr;
use crate::macros::for_all_primitive_types;
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
use snafu::ensure;
use std::fmt::Debug;

/// Trait for types that can be placed on the [`PrimitiveArray`]
pub trait PrimitiveType:
    Sealed + Copy + Debug + Default + PartialEq + PartialOrd + Send + Sync + 'static
{
    /// Name of the type, used in the error message and the debug
    const NAME: &'static str;

    /// Physical type of the [`PrimitiveArray`] that stores this type
    const PHYSICAL_TYPE: PhysicalType;

    /// Default logical type of this primitive type
    const LOGICAL_TYPE: LogicalType;

    /// Write the little-endian bytes of self to the start of `out`
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than `size_of::<Self>()`
    fn write_le(&self, out: &mut [u8]);

    /// Read the value from the little-endian bytes at the start of `bytes`
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than `size_of::<Self>()`
    fn read_le(bytes: &[u8]) -> Self;

    /// Read the value from the native-endian bytes at the start of `bytes`
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than `size_of::<Self>()`
    fn read_ne(bytes: &[u8]) -> Self;

    /// View self as its native-endian memory bytes
    fn as_ne_bytes(&self) -> &[u8];

    /// Downcast the [`ArrayImpl`] to the [`PrimitiveArray`] of this type
    fn downcast_array(array: &ArrayImpl) -> Result<&PrimitiveArray<Self>>;

    /// Downcast the mutable [`ArrayImpl`] to the [`PrimitiveArray`] of this type
    fn downcast_array_mut(array: &mut ArrayImpl) -> Result<&mut PrimitiveArray<Self>>;
}

macro_rules! impl_primitive_type {
    ($({$variant:ident, $ty:ty, $alias:ident, $lt:ident}),*) => {
        $(
            impl Sealed for $ty {}

            impl PrimitiveType for $ty {
                const NAME: &'static str = stringify!($variant);
                const PHYSICAL_TYPE: PhysicalType = PhysicalType::$variant;
                const LOGICAL_TYPE: LogicalType = LogicalType::$lt;

                #[inline]
                fn write_le(&self, out: &mut [u8]) {
                    out[..size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0; size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..size_of::<$ty>()]);
                    <$ty>::from_le_bytes(buf)
                }

                #[inline]
                fn read_ne(bytes: &[u8]) -> Self {
                    let mut buf = [0; size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..size_of::<$ty>()]);
                    <$ty>::from_ne_bytes(buf)
                }

                #[inline]
                fn as_ne_bytes(&self) -> &[u8] {
                    // SAFETY: primitive types do not have padding and any byte is initialized
                    unsafe {
                        std::slice::from_raw_parts(
                            self as *const $ty as *const u8,
                            size_of::<$ty>(),
                        )
                    }
                }

                #[inline]
                fn downcast_array(array: &ArrayImpl) -> Result<&$alias> {
                    array.try_into()
                }

                #[inline]
                fn downcast_array_mut(array: &mut ArrayImpl) -> Result<&mut $alias> {
                    array.try_into()
                }
            }
        )*
    };
}

for_all_primitive_types!(impl_primitive_type);

/// [`PrimitiveArray`] that stores fixed byte-width data, such as `i32` or `f64`
pub struct PrimitiveArray<T: PrimitiveType> {
    logical_type: LogicalType,
    data: CowPtr<Vec<T>>,
    validity: CowPtr<Vec<bool>>,
}

impl<T: PrimitiveType> PrimitiveArray<T> {
    /// Create a new empty [`PrimitiveArray`]
    #[inline]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == T::PHYSICAL_TYPE,
            InvalidLogicalTypeSnafu {
                array_name: format!("{}Array", T::NAME),
                array_physical_type: T::PHYSICAL_TYPE,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::new_unchecked(logical_type)) }
    }

    /// Create a new empty [`PrimitiveArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `T::PHYSICAL_TYPE`
    #[inline]
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        Self {
            logical_type,
            data: CowPtr::default(),
            validity: CowPtr::default(),
        }
    }

    /// Get the values of the array. Value of the null element is garbage
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// Construct [`Self`] from iterator of values, all of them are valid
    pub fn from_values_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            logical_type: T::LOGICAL_TYPE,
            data: CowPtr::new(iter.into_iter().collect()),
            validity: CowPtr::default(),
        }
    }

    /// Append an element to the array
    #[inline]
    pub fn push(&mut self, value: Option<T>) {
        push_validity(&mut self.validity, self.data.len(), value.is_some());
        self.data.make_mut().push(value.unwrap_or_default());
    }
}

impl<T: PrimitiveType> FromIterator<Option<T>> for PrimitiveArray<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        // SAFETY: default logical type matches
        let mut array = unsafe { Self::new_unchecked(T::LOGICAL_TYPE) };
        iter.into_iter().for_each(|value| array.push(value));
        array
    }
}

macro_rules! alias {
    ($({$_:ident, $ty:ty, $alias:ident, $lt:ident}),*) => {
        $(
            #[doc = concat!("A [`PrimitiveArray`] of [`", stringify!($ty), "`]")]
            pub type $alias = PrimitiveArray<$ty>;
        )*
    };
}

for_all_primitive_types!(alias);

impl<T: PrimitiveType> Debug for PrimitiveArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Array {{ logical_type: {:?}, len: {}, data: ",
            T::NAME,
            self.logical_type,
            self.len()
        )?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl<T: PrimitiveType> Clone for PrimitiveArray<T> {
    fn clone(&self) -> Self {
        Self {
            logical_type: self.logical_type.clone(),
            data: self.data.clone(),
            validity: self.validity.clone(),
        }
    }
}

impl<T: PrimitiveType> Sealed for PrimitiveArray<T> {}

impl<T: PrimitiveType> Array for PrimitiveArray<T> {
    const PHYSICAL_TYPE: PhysicalType = T::PHYSICAL_TYPE;

    type ValueRef<'a> = T;

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    #[inline]
    fn validity(&self) -> &[bool] {
        &self.validity
    }

    #[inline]
    unsafe fn get_value_unchecked(&self, index: usize) -> T {
        #[cfg(feature = "verify")]
        assert!(index < self.len());

        unsafe { *self.data.get_unchecked(index) }
    }

    #[inline]
    fn reference(&mut self, other: &Self) {
        self.logical_type = other.logical_type.clone();
        self.data = other.data.clone();
        self.validity = other.validity.clone();
    }

    #[inline]
    fn push_null(&mut self) {
        self.push(None);
    }

    #[inline]
    fn clear(&mut self) {
        self.data.make_mut().clear();
        self.validity.make_mut().clear();
    }

    fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.data.make_mut().truncate(len);
            truncate_validity(&mut self.validity, len);
        }
    }
}
