//! Array that stores the variable-width data types

use std::fmt::Debug;

use snafu::ensure;

use crate::cow::CowPtr;
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};

use super::{push_validity, truncate_validity, Array, InvalidLogicalTypeSnafu, Result};

/// Offset in the binary array
///
/// Most of the time, we are running on 64 bit machines
pub type Offset = u64;

/// [`BinaryArray`] stores the array of `Vec<u8>`. `VARCHAR` is stored in it as well,
/// Utf-8 is a property of the logical type
#[derive(Clone)]
pub struct BinaryArray {
    logical_type: LogicalType,
    /// A continuous byte array that stores the data of the element, to access the data
    /// in the array, you need to depend on [`Self::offsets`]
    bytes: CowPtr<Vec<u8>>,
    /// offsets[i] and offsets[i+1] represents the start and end address of the ith
    /// element in the array. Therefore, its length is always equal to self.len() + 1
    offsets: CowPtr<Vec<Offset>>,
    validity: CowPtr<Vec<bool>>,
}

impl BinaryArray {
    /// Create a new [`BinaryArray`]
    #[inline]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == PhysicalType::Binary,
            InvalidLogicalTypeSnafu {
                array_name: "BinaryArray".to_string(),
                array_physical_type: PhysicalType::Binary,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::new_unchecked(logical_type)) }
    }

    /// Create a new [`BinaryArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `Binary`
    #[inline]
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        Self {
            logical_type,
            bytes: CowPtr::default(),
            offsets: CowPtr::new(vec![0]),
            validity: CowPtr::default(),
        }
    }

    /// Construct `VARBINARY` array from iterator of values, all of them are valid
    pub fn from_values_iter<V: AsRef<[u8]>, I: IntoIterator<Item = V>>(iter: I) -> Self {
        // SAFETY: VarBinary is binary
        let mut array = unsafe { Self::new_unchecked(LogicalType::VarBinary) };
        iter.into_iter()
            .for_each(|value| array.push(Some(value.as_ref())));
        array
    }

    /// Construct `VARCHAR` array from iterator of strings, all of them are valid
    pub fn from_strs<'a, I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut array = Self::from_values_iter(iter);
        array.logical_type = LogicalType::VarChar;
        array
    }

    /// Get the bytes of the element at `index`, bytes of the null element is empty. Panics
    /// if the index out of bounds
    #[inline]
    pub fn value(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.bytes[start..end]
    }

    /// Offsets of the elements, starts with zero
    #[inline]
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// Append an element to the array
    pub fn push(&mut self, value: Option<&[u8]>) {
        let len = self.len();
        push_validity(&mut self.validity, len, value.is_some());
        if let Some(value) = value {
            self.bytes.make_mut().extend_from_slice(value);
        }
        let end = self.bytes.len() as Offset;
        self.offsets.make_mut().push(end);
    }
}

impl<V: AsRef<[u8]>> FromIterator<Option<V>> for BinaryArray {
    fn from_iter<I: IntoIterator<Item = Option<V>>>(iter: I) -> Self {
        // SAFETY: VarBinary is binary
        let mut array = unsafe { Self::new_unchecked(LogicalType::VarBinary) };
        iter.into_iter()
            .for_each(|value| array.push(value.as_ref().map(|v| v.as_ref())));
        array
    }
}

impl Debug for BinaryArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BinaryArray {{ logical_type: {:?}, len: {}, data: ",
            self.logical_type,
            self.len()
        )?;
        if matches!(self.logical_type, LogicalType::VarChar) {
            f.debug_list()
                .entries(
                    self.iter()
                        .map(|value| value.map(|v| String::from_utf8_lossy(v))),
                )
                .finish()?;
        } else {
            f.debug_list().entries(self.iter()).finish()?;
        }
        write!(f, " }}")
    }
}

impl Sealed for BinaryArray {}

impl Array for BinaryArray {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Binary;

    type ValueRef<'a> = &'a [u8];

    #[inline]
    fn len(&self) -> usize {
        self.offsets.len() - 1
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
    unsafe fn get_value_unchecked(&self, index: usize) -> &[u8] {
        #[cfg(feature = "verify")]
        assert!(index < self.len());

        unsafe {
            let start = *self.offsets.get_unchecked(index) as usize;
            let end = *self.offsets.get_unchecked(index + 1) as usize;
            self.bytes.get_unchecked(start..end)
        }
    }

    #[inline]
    fn reference(&mut self, other: &Self) {
        self.logical_type = other.logical_type.clone();
        self.bytes = other.bytes.clone();
        self.offsets = other.offsets.clone();
        self.validity = other.validity.clone();
    }

    #[inline]
    fn push_null(&mut self) {
        self.push(None);
    }

    fn clear(&mut self) {
        self.bytes.make_mut().clear();
        let offsets = self.offsets.make_mut();
        offsets.clear();
        offsets.push(0);
        self.validity.make_mut().clear();
    }

    fn truncate(&mut self, len: usize) {
        if len < self.len() {
            let end = self.offsets[len] as usize;
            self.offsets.make_mut().truncate(len + 1);
            self.bytes.make_mut().truncate(end);
            truncate_validity(&mut self.validity, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_push() {
        let mut array = BinaryArray::from_strs(["aggregate", ""]);
        array.push(None);
        array.push(Some(b"data-block".as_slice()));
        assert_eq!(array.len(), 4);
        assert_eq!(array.offsets(), &[0, 9, 9, 9, 19]);
        assert_eq!(array.get(1), Some(b"".as_slice()));
        assert_eq!(array.get(2), None);
        assert_eq!(array.value(3), b"data-block");

        expect![[r#"BinaryArray { logical_type: VarChar, len: 4, data: [Some("aggregate"), Some(""), None, Some("data-block")] }"#]]
            .assert_eq(&format!("{array:?}"));
    }

    #[test]
    fn test_clear_keeps_leading_offset() {
        let mut array = BinaryArray::from_iter([Some("a"), None]);
        let shared = array.clone();
        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.offsets(), &[0]);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared.validity(), &[true, false]);
    }

    #[test]
    fn test_new_with_invalid_type() {
        assert!(BinaryArray::new(LogicalType::Integer).is_err());
        assert!(BinaryArray::new(LogicalType::VarChar).is_ok());
    }
}
