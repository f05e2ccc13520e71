//! Elements in the array are list

use snafu::ensure;

use crate::array::InvalidLogicalTypeSnafu;
use crate::cow::CowPtr;
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
use crate::utils::{decode_var_uint, encode_var_uint, var_uint_size};
use std::fmt::Debug;

use super::{
    push_validity, truncate_validity, Array, ArrayError, ArrayImpl, InvalidValidityFlagSnafu,
    Result, ScalarRef, TruncatedValueSnafu,
};

/// Validity flag of the valid element in the serialized list
const VALID_FLAG: u8 = 1;
/// Validity flag of the null element in the serialized list
const NULL_FLAG: u8 = 0;

/// [Array of lists](https://facebookincubator.github.io/velox/develop/vectors.html#flat-vectors-complex-types)
///
/// Elements of all of the lists are stored in a single child array. List `i` contains
/// the elements in the range `offsets[i]..offsets[i+1]` of the child array
#[derive(Clone)]
pub struct ListArray {
    logical_type: LogicalType,
    /// Length is always equal to self.len() + 1, starts with zero
    offsets: CowPtr<Vec<u64>>,
    /// array that contains its elements
    elements: CowPtr<ArrayImpl>,
    validity: CowPtr<Vec<bool>>,
}

/// Reference to a list in the [`ListArray`]
#[derive(Clone, Copy)]
pub struct ListRef<'a> {
    elements: &'a ArrayImpl,
    start: usize,
    len: usize,
}

impl<'a> ListRef<'a> {
    /// Number of elements in the list
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list does not have element
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the element at `index` in the list. Panics if the index out of bounds
    #[inline]
    pub fn get(&self, index: usize) -> Option<ScalarRef<'a>> {
        assert!(index < self.len);
        self.elements.get(self.start + index)
    }

    /// Iterate the elements in the list
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Option<ScalarRef<'a>>> + use<'a> {
        let elements = self.elements;
        (self.start..self.start + self.len).map(move |index| elements.get(index))
    }
}

impl PartialEq for ListRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Debug for ListRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl ListArray {
    /// Create a new empty [`ListArray`]
    #[inline]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == PhysicalType::List,
            InvalidLogicalTypeSnafu {
                array_name: "ListArray".to_string(),
                array_physical_type: PhysicalType::List,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::new_unchecked(logical_type)) }
    }

    /// Create a new empty [`ListArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `List`
    #[inline]
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        #[cfg(feature = "verify")]
        assert_eq!(logical_type.physical_type(), PhysicalType::List);

        let elements = match &logical_type {
            LogicalType::List { element_type, .. } => ArrayImpl::new((**element_type).clone()),
            // SAFETY: guaranteed by the caller
            _ => unsafe { std::hint::unreachable_unchecked() },
        };
        Self {
            logical_type,
            offsets: CowPtr::new(vec![0]),
            elements: CowPtr::new(elements),
            validity: CowPtr::default(),
        }
    }

    /// Get the child array that stores the elements of all of the lists
    #[inline]
    pub fn elements(&self) -> &ArrayImpl {
        &self.elements
    }

    /// Get the mutable child array. The elements appended to it belong to the list that
    /// is finished by the next [`Self::finish_list`]
    #[inline]
    pub fn elements_mut(&mut self) -> &mut ArrayImpl {
        self.elements.make_mut()
    }

    /// Offsets of the lists, starts with zero
    #[inline]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Finish a valid list that contains all of the elements appended after the previous
    /// list
    pub fn finish_list(&mut self) {
        let len = self.len();
        push_validity(&mut self.validity, len, true);
        let end = self.elements.len() as u64;
        self.offsets.make_mut().push(end);
    }

    /// Get the list at `index`, the list is empty if it is null. Panics if the index out
    /// of bounds
    #[inline]
    pub fn value(&self, index: usize) -> ListRef<'_> {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        ListRef {
            elements: &self.elements,
            start,
            len: end - start,
        }
    }

    /// Number of bytes the serialized list at `index` occupies
    pub(super) fn serialized_size(&self, index: usize) -> usize {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        (start..end).fold(var_uint_size((end - start) as u64), |size, element| {
            if self.elements.is_valid(element) {
                size + 1 + self.elements.serialized_size(element)
            } else {
                size + 1
            }
        })
    }

    /// Serialize the list at `index` to the start of `out`
    pub(super) fn serialize_row(&self, index: usize, out: &mut [u8]) -> usize {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        let mut written = encode_var_uint((end - start) as u64, out);
        for element in start..end {
            if self.elements.is_valid(element) {
                out[written] = VALID_FLAG;
                written += 1;
                written += self.elements.serialize_row(element, &mut out[written..]);
            } else {
                out[written] = NULL_FLAG;
                written += 1;
            }
        }
        written
    }

    /// Deserialize the list at the start of `bytes` and append it to self. On error, the
    /// elements appended by this call are removed and self is unchanged
    pub(super) fn append_from_serialized(&mut self, bytes: &[u8]) -> Result<usize> {
        let (len, read) = decode_var_uint(bytes).map_err(|source| ArrayError::MalformedLength {
            array: "ListArray",
            source,
        })?;
        let start = self.elements.len();
        match append_serialized_elements(self.elements.make_mut(), len, bytes, read) {
            Ok(read) => {
                self.finish_list();
                Ok(read)
            }
            Err(error) => {
                self.elements.make_mut().truncate(start);
                Err(error)
            }
        }
    }
}

/// Append `len` serialized elements starting at `bytes[read..]`, returns the position
/// after the last element
fn append_serialized_elements(
    elements: &mut ArrayImpl,
    len: u64,
    bytes: &[u8],
    mut read: usize,
) -> Result<usize> {
    for _ in 0..len {
        ensure!(
            read < bytes.len(),
            TruncatedValueSnafu {
                array: "ListArray",
                needed: 1_usize,
                remaining: 0_usize,
            }
        );
        let flag = bytes[read];
        read += 1;
        match flag {
            VALID_FLAG => read += elements.append_from_serialized(&bytes[read..])?,
            NULL_FLAG => elements.push_null(),
            _ => {
                return InvalidValidityFlagSnafu {
                    array: "ListArray",
                    flag,
                }
                .fail();
            }
        }
    }
    Ok(read)
}

impl Debug for ListArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ListArray {{ logical_type: {:?}, len: {}, data: ",
            self.logical_type,
            self.len()
        )?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl Sealed for ListArray {}

impl Array for ListArray {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::List;

    type ValueRef<'a> = ListRef<'a>;

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
    unsafe fn get_value_unchecked(&self, index: usize) -> ListRef<'_> {
        #[cfg(feature = "verify")]
        assert!(index < self.len());

        unsafe {
            let start = *self.offsets.get_unchecked(index) as usize;
            let end = *self.offsets.get_unchecked(index + 1) as usize;
            ListRef {
                elements: &self.elements,
                start,
                len: end - start,
            }
        }
    }

    #[inline]
    fn reference(&mut self, other: &Self) {
        self.logical_type = other.logical_type.clone();
        self.offsets = other.offsets.clone();
        self.elements = other.elements.clone();
        self.validity = other.validity.clone();
    }

    fn push_null(&mut self) {
        let len = self.len();
        push_validity(&mut self.validity, len, false);
        let end = self.offsets[self.offsets.len() - 1];
        self.offsets.make_mut().push(end);
    }

    fn clear(&mut self) {
        let offsets = self.offsets.make_mut();
        offsets.clear();
        offsets.push(0);
        self.elements.make_mut().clear();
        self.validity.make_mut().clear();
    }

    fn truncate(&mut self, len: usize) {
        if len < self.len() {
            let end = self.offsets[len] as usize;
            self.offsets.make_mut().truncate(len + 1);
            self.elements.make_mut().truncate(end);
            truncate_validity(&mut self.validity, len);
        }
    }
}
