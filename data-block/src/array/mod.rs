//! [`Array`] is the memory format of the columnar storage.
//!
//! Heavily adapted from [`type-exercise-in-rust`](https://github.com/skyzh/type-exercise-in-rust)
//!
//! All of the buffers in the arrays are held by [`CowPtr`]. Reading the array never
//! copies, [`Array::reference`] shares the buffers of another array and writing to the
//! array goes through [`CowPtr::make_mut`]: the buffer is cloned if it is shared by other
//! arrays.
//!
//! [`CowPtr`]: crate::cow::CowPtr
//! [`CowPtr::make_mut`]: crate::cow::CowPtr::make_mut

pub mod binary;
pub mod iter;
pub mod list;
pub mod primitive;

use self::iter::ArrayIter;
use crate::cow::CowPtr;
use crate::macros::{for_all_primitive_types, for_all_variants};
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
use crate::utils::VarUintError;
pub use binary::BinaryArray;
pub use list::{ListArray, ListRef};
pub use primitive::*;
use snafu::Snafu;
use std::fmt::Debug;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ArrayError {
    #[snafu(display(
        "Invalid logical type `{:?}({})` passed to creating a new array `{}` that has `{}`",
        logical_type,
        logical_type.physical_type(),
        array_name,
        array_physical_type
    ))]
    InvalidLogicalType {
        array_name: String,
        array_physical_type: PhysicalType,
        logical_type: LogicalType,
    },
    #[snafu(display(
        "Can not reference `{array}` to `{target}`, reference requires two arrays have same type"
    ))]
    Reference {
        array: &'static str,
        target: &'static str,
    },
    #[snafu(display("Can not convert `ArrayImpl::{array}` array into `{target}` array"))]
    Convert {
        array: &'static str,
        target: &'static str,
    },
    #[snafu(display("Values in `{array}` can not be viewed as raw bytes"))]
    RawBytesUnsupported { array: &'static str },
    #[snafu(display("`{array}` expects raw bytes with length `{expect}`, found `{actual}`"))]
    RawBytesLength {
        array: &'static str,
        expect: usize,
        actual: usize,
    },
    #[snafu(display(
        "Serialized value of `{array}` is truncated, need `{needed}` bytes but only `{remaining}` bytes remain"
    ))]
    TruncatedValue {
        array: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[snafu(display("Serialized value of `{array}` has malformed length"))]
    MalformedLength {
        array: &'static str,
        source: VarUintError,
    },
    #[snafu(display("Serialized value of `{array}` has invalid validity flag `{flag}`"))]
    InvalidValidityFlag { array: &'static str, flag: u8 },
}

type Result<T> = std::result::Result<T, ArrayError>;

/// A trait over all arrays
///
/// Validity of the array follows the convention: if the validity is empty, all of the
/// elements in the array are valid. Otherwise, it has the same length with the array
pub trait Array: Sealed + Debug + 'static + Sized {
    /// Physical type of the array
    const PHYSICAL_TYPE: PhysicalType;

    /// Reference to the value in the array
    type ValueRef<'a>: Copy + Debug;

    /// Get the number of elements in the [`Array`]
    fn len(&self) -> usize;

    /// Returns `true` if the [`Array`] contains no elements
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the logical type of the array. This function enforces each array implementation
    /// should have a [`LogicalType`] as its field
    fn logical_type(&self) -> &LogicalType;

    /// Get the validity. **If the validity is not empty, the length must equal to
    /// [`Self::len`]**
    fn validity(&self) -> &[bool];

    /// Returns true if the element at the given index is not null
    #[inline]
    fn is_valid(&self, index: usize) -> bool {
        let validity = self.validity();
        validity.is_empty() || validity[index]
    }

    /// Returns a reference to the value at the given index without bound check, the
    /// value may be garbage if the element is null
    ///
    /// # Safety
    /// Caller should guarantee `index < self.len()`, otherwise, [undefined behavior] happens
    ///
    /// [undefined behavior]: https://doc.rust-lang.org/reference/behavior-considered-undefined.html
    unsafe fn get_value_unchecked(&self, index: usize) -> Self::ValueRef<'_>;

    /// Returns a reference to the element at the given index. It will panic if the index
    /// out of bounds
    #[inline]
    fn get(&self, index: usize) -> Option<Self::ValueRef<'_>> {
        assert!(index < self.len());
        if self.is_valid(index) {
            // SAFETY: we check the bound above
            unsafe { Some(self.get_value_unchecked(index)) }
        } else {
            None
        }
    }

    /// Get iterator of the array
    #[inline]
    fn iter(&self) -> ArrayIter<'_, Self> {
        ArrayIter::new(self)
    }

    // Mutate array

    /// Reference self to other array, self and other share the buffers after this
    /// function. No copy happens
    fn reference(&mut self, other: &Self);

    /// Append a `NULL` to the array
    fn push_null(&mut self);

    /// Clear the array
    fn clear(&mut self);

    /// Shorten the array to its first `len` elements. No-op if `len` is not less than
    /// [`Self::len`]
    fn truncate(&mut self, len: usize);
}

/// Mark the element `len` as valid or not. It is called before the value is appended
#[inline]
pub(crate) fn push_validity(validity: &mut CowPtr<Vec<bool>>, len: usize, valid: bool) {
    if validity.is_empty() {
        if valid {
            return;
        }
        let validity = validity.make_mut();
        validity.resize(len, true);
        validity.push(false);
    } else {
        validity.make_mut().push(valid);
    }
}

/// Shorten the validity to `len`. An empty validity means all valid and stays empty
#[inline]
pub(crate) fn truncate_validity(validity: &mut CowPtr<Vec<bool>>, len: usize) {
    if validity.len() > len {
        validity.make_mut().truncate(len);
    }
}

/// Reference to an element in the [`ArrayImpl`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarRef<'a> {
    /// `i8`
    Int8(i8),
    /// `u8`
    UInt8(u8),
    /// `i16`
    Int16(i16),
    /// `u16`
    UInt16(u16),
    /// `i32`
    Int32(i32),
    /// `u32`
    UInt32(u32),
    /// `i64`
    Int64(i64),
    /// `u64`
    UInt64(u64),
    /// `f32`
    Float32(f32),
    /// `f64`
    Float64(f64),
    /// `i128`
    Int128(i128),
    /// Bytes
    Binary(&'a [u8]),
    /// List
    List(ListRef<'a>),
}

macro_rules! array_impl {
    ($({$variant:ident, $array_ty:ident}),+) => {
        /// Implementations of the [`Array`], enum dispatch
        #[derive(Debug, Clone)]
        pub enum ArrayImpl {
            $(
                #[doc = concat!("[`", stringify!($array_ty), "`]")]
                $variant($array_ty)
            ),+
        }

        impl ArrayImpl {
            /// Create a new empty [`ArrayImpl`] based on the [`LogicalType`]
            pub fn new(logical_type: LogicalType) -> Self {
                let physical_type = logical_type.physical_type();
                // SAFETY: the array is chosen based on the physical type
                unsafe {
                    match physical_type {
                        $(
                            PhysicalType::$variant => ArrayImpl::$variant($array_ty::new_unchecked(logical_type)),
                        )+
                    }
                }
            }

            /// Get the number of elements in the Array
            pub fn len(&self) -> usize {
                match self {
                    $(
                        Self::$variant(array) => array.len(),
                    )+
                }
            }

            /// Returns `true` if the Array contains no elements
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Get ident of the array
            pub fn ident(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                }
            }

            /// Return the [`LogicalType`] of the array
            pub fn logical_type(&self) -> &LogicalType {
                match self {
                    $(
                        Self::$variant(array) => array.logical_type(),
                    )+
                }
            }

            /// Returns true if the element at the given index is not null
            pub fn is_valid(&self, index: usize) -> bool {
                match self {
                    $(
                        Self::$variant(array) => array.is_valid(index),
                    )+
                }
            }

            /// Get element ref. It will panic if the index out of bounds
            pub fn get(&self, index: usize) -> Option<ScalarRef<'_>> {
                match self {
                    $(
                        Self::$variant(array) => array.get(index).map(ScalarRef::$variant),
                    )+
                }
            }

            /// Reference to other array
            ///
            /// If self and other do not have same physical type, return error
            pub fn reference(&mut self, other: &Self) -> Result<()> {
                match (self, other) {
                    $(
                        (ArrayImpl::$variant(lhs), ArrayImpl::$variant(rhs)) => {
                            lhs.reference(rhs);
                            Ok(())
                        }
                    )+
                    (lhs, rhs) => ReferenceSnafu {
                        array: lhs.ident(),
                        target: rhs.ident(),
                    }
                    .fail(),
                }
            }

            /// Append a `NULL` to the array
            pub fn push_null(&mut self) {
                match self {
                    $(
                        Self::$variant(array) => array.push_null(),
                    )+
                }
            }

            /// Clear the array
            pub fn clear(&mut self) {
                match self {
                    $(
                        Self::$variant(array) => array.clear(),
                    )+
                }
            }

            /// Shorten the array to its first `len` elements
            pub fn truncate(&mut self, len: usize) {
                match self {
                    $(
                        Self::$variant(array) => array.truncate(len),
                    )+
                }
            }
        }

        $(
            impl<'a> TryFrom<&'a ArrayImpl> for &'a $array_ty {
                type Error = ArrayError;

                fn try_from(array: &'a ArrayImpl) -> Result<&'a $array_ty> {
                    if let ArrayImpl::$variant(array) = array {
                        Ok(array)
                    } else {
                        ConvertSnafu {
                            array: array.ident(),
                            target: stringify!($array_ty),
                        }
                        .fail()
                    }
                }
            }

            impl<'a> TryFrom<&'a mut ArrayImpl> for &'a mut $array_ty {
                type Error = ArrayError;

                fn try_from(array: &'a mut ArrayImpl) -> Result<&'a mut $array_ty> {
                    if let ArrayImpl::$variant(array) = array {
                        Ok(array)
                    } else {
                        ConvertSnafu {
                            array: array.ident(),
                            target: stringify!($array_ty),
                        }
                        .fail()
                    }
                }
            }

            impl From<$array_ty> for ArrayImpl {
                #[inline]
                fn from(array: $array_ty) -> Self {
                    Self::$variant(array)
                }
            }
        )+
    };
}

for_all_variants!(array_impl);

/// Row level byte access. The generic aggregation functions identify the values with
/// these bytes
impl ArrayImpl {
    /// View the value at `index` as raw bytes, without serialization. Only the arrays whose
    /// values live in a continuous memory region support it, see
    /// [`PhysicalType::is_value_contiguous`]. Primitive values are viewed in native
    /// endianness. Panics if the index out of bounds
    pub fn raw_bytes(&self, index: usize) -> Result<&[u8]> {
        macro_rules! raw_bytes {
            ($({$variant:ident, $ty:ty, $array:ident, $lt:ident}),*) => {
                match self {
                    $(
                        Self::$variant(array) => Ok(array.values()[index].as_ne_bytes()),
                    )*
                    Self::Binary(array) => Ok(array.value(index)),
                    Self::List(_) => RawBytesUnsupportedSnafu { array: "ListArray" }.fail(),
                }
            };
        }

        for_all_primitive_types!(raw_bytes)
    }

    /// Append the value represented by the raw bytes, inverse of [`Self::raw_bytes`]
    pub fn append_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        macro_rules! append_raw_bytes {
            ($({$variant:ident, $ty:ty, $array:ident, $lt:ident}),*) => {
                match self {
                    $(
                        Self::$variant(array) => {
                            snafu::ensure!(
                                bytes.len() == size_of::<$ty>(),
                                RawBytesLengthSnafu {
                                    array: stringify!($array),
                                    expect: size_of::<$ty>(),
                                    actual: bytes.len(),
                                }
                            );
                            array.push(Some(<$ty as PrimitiveType>::read_ne(bytes)));
                            Ok(())
                        }
                    )*
                    Self::Binary(array) => {
                        array.push(Some(bytes));
                        Ok(())
                    }
                    Self::List(_) => RawBytesUnsupportedSnafu { array: "ListArray" }.fail(),
                }
            };
        }

        for_all_primitive_types!(append_raw_bytes)
    }

    /// Number of bytes [`Self::serialize_row`] writes for the element at `index`. Panics if
    /// the index out of bounds
    ///
    /// Format:
    /// - primitive: little-endian bytes
    /// - binary: var uint length, then the bytes
    /// - list: var uint number of elements, then each element is a validity byte followed
    ///   by the serialized element if the element is valid
    pub fn serialized_size(&self, index: usize) -> usize {
        macro_rules! serialized_size {
            ($({$variant:ident, $ty:ty, $array:ident, $lt:ident}),*) => {
                match self {
                    $(
                        Self::$variant(_) => size_of::<$ty>(),
                    )*
                    Self::Binary(array) => {
                        let len = array.value(index).len();
                        crate::utils::var_uint_size(len as u64) + len
                    }
                    Self::List(array) => array.serialized_size(index),
                }
            };
        }

        for_all_primitive_types!(serialized_size)
    }

    /// Serialize the element at `index` into the start of `out`, returns the number of
    /// bytes written. `NULL` is not a value, caller should check the validity
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`Self::serialized_size`] or the index out of bounds
    pub fn serialize_row(&self, index: usize, out: &mut [u8]) -> usize {
        macro_rules! serialize_row {
            ($({$variant:ident, $ty:ty, $array:ident, $lt:ident}),*) => {
                match self {
                    $(
                        Self::$variant(array) => {
                            array.values()[index].write_le(out);
                            size_of::<$ty>()
                        }
                    )*
                    Self::Binary(array) => {
                        let value = array.value(index);
                        let written = crate::utils::encode_var_uint(value.len() as u64, out);
                        out[written..written + value.len()].copy_from_slice(value);
                        written + value.len()
                    }
                    Self::List(array) => array.serialize_row(index, out),
                }
            };
        }

        for_all_primitive_types!(serialize_row)
    }

    /// Deserialize the value at the start of `bytes` and append it to self, returns the
    /// number of bytes consumed. Inverse of [`Self::serialize_row`]
    ///
    /// If error happens, the content of the array is undefined
    pub fn append_from_serialized(&mut self, bytes: &[u8]) -> Result<usize> {
        macro_rules! append_from_serialized {
            ($({$variant:ident, $ty:ty, $array:ident, $lt:ident}),*) => {
                match self {
                    $(
                        Self::$variant(array) => {
                            snafu::ensure!(
                                bytes.len() >= size_of::<$ty>(),
                                TruncatedValueSnafu {
                                    array: stringify!($array),
                                    needed: size_of::<$ty>(),
                                    remaining: bytes.len(),
                                }
                            );
                            array.push(Some(<$ty as PrimitiveType>::read_le(bytes)));
                            Ok(size_of::<$ty>())
                        }
                    )*
                    Self::Binary(array) => {
                        let (len, read) = crate::utils::decode_var_uint(bytes)
                            .map_err(|source| ArrayError::MalformedLength {
                                array: "BinaryArray",
                                source,
                            })?;
                        let remaining = bytes.len() - read;
                        snafu::ensure!(
                            len <= remaining as u64,
                            TruncatedValueSnafu {
                                array: "BinaryArray",
                                needed: len as usize,
                                remaining,
                            }
                        );
                        let len = len as usize;
                        array.push(Some(&bytes[read..read + len]));
                        Ok(read + len)
                    }
                    Self::List(array) => array.append_from_serialized(bytes),
                }
            };
        }

        for_all_primitive_types!(append_from_serialized)
    }
}
