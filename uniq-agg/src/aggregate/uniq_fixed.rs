//! `groupUniqArray` over the fixed width values

use std::fmt::Debug;
use std::hash::Hash;

use data_block::array::ListArray;
use data_block::types::PrimitiveType;
use snafu::ResultExt;

use super::{ArraySnafu, DecodeSnafu, GrowSetSnafu, Result};
use crate::common::hash_set::{FixedGrowth, UniqSet};
use crate::common::io::{write_var_uint, ReadBuffer};

/// Extension for float
trait FloatExt: num_traits::Float {
    // Normalize the float, make `NaN`/`-Nan` and `-0.0`/`0.0` consistent
    #[inline]
    fn normalize(self) -> Self {
        if self.is_nan() {
            Self::nan()
        } else if self.is_zero() {
            Self::zero()
        } else {
            self
        }
    }
}

impl FloatExt for f32 {}
impl FloatExt for f64 {}

/// Fixed width value that can be stored in [`FixedUniqState`]
pub trait FixedWidthValue: PrimitiveType {
    /// Key stored in the set. Two values are equal if their keys are equal
    type Key: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Convert the value into key
    fn to_key(self) -> Self::Key;

    /// Convert the key back into value
    fn from_key(key: Self::Key) -> Self;
}

macro_rules! impl_integer_value {
    ($($ty:ty),*) => {
        $(
            impl FixedWidthValue for $ty {
                type Key = $ty;

                #[inline]
                fn to_key(self) -> $ty {
                    self
                }

                #[inline]
                fn from_key(key: $ty) -> $ty {
                    key
                }
            }
        )*
    };
}

impl_integer_value!(i8, u8, i16, u16, i32, u32, i64, u64, i128);

macro_rules! impl_float_value {
    ($({$ty:ty, $bits:ty}),*) => {
        $(
            impl FixedWidthValue for $ty {
                type Key = $bits;

                #[inline]
                fn to_key(self) -> $bits {
                    self.normalize().to_bits()
                }

                #[inline]
                fn from_key(key: $bits) -> $ty {
                    <$ty>::from_bits(key)
                }
            }
        )*
    };
}

impl_float_value!({f32, u32}, {f64, u64});

/// State of the `groupUniqArray` whose argument is fixed width value
#[derive(Debug)]
pub struct FixedUniqState<T: FixedWidthValue> {
    set: UniqSet<T::Key, FixedGrowth>,
    max_size: usize,
}

impl<T: FixedWidthValue> Default for FixedUniqState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FixedWidthValue> FixedUniqState<T> {
    /// Create a new empty state that can hold unlimited unique values
    pub fn new() -> Self {
        Self::with_max_size(None)
    }

    /// Create a new empty state that holds at most `max_size` unique values, new
    /// values are ignored when the state is full
    pub fn with_max_size(max_size: Option<usize>) -> Self {
        Self {
            set: UniqSet::new(),
            max_size: max_size.unwrap_or(usize::MAX),
        }
    }

    /// Number of unique values
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns true if the state does not have value
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Add the value, returns true if the value is new
    #[inline]
    pub fn add(&mut self, value: T) -> Result<bool> {
        self.insert_key(value.to_key())
    }

    #[inline]
    fn insert_key(&mut self, key: T::Key) -> Result<bool> {
        if self.set.len() >= self.max_size {
            return Ok(false);
        }
        self.set.insert(key).context(GrowSetSnafu)
    }

    /// Merge the values in other state into self
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        for (hash, &key) in other.set.iter_hashed() {
            if self.set.len() >= self.max_size {
                break;
            }
            if self.set.find_hashed(hash, |k| *k == key).is_none() {
                self.set.try_reserve_one().context(GrowSetSnafu)?;
                self.set.insert_unique_hashed(hash, key);
            }
        }
        Ok(())
    }

    /// Serialize the state: var uint count, then little-endian values
    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_var_uint(self.set.len() as u64, out);
        out.reserve(self.set.len() * size_of::<T>());
        for &key in self.set.iter() {
            let start = out.len();
            out.resize(start + size_of::<T>(), 0);
            T::from_key(key).write_le(&mut out[start..]);
        }
    }

    /// Deserialize the state written by [`Self::serialize`]
    pub fn deserialize(buf: &mut ReadBuffer<'_>, max_size: Option<usize>) -> Result<Self> {
        let mut state = Self::with_max_size(max_size);
        state.deserialize_into(buf)?;
        Ok(state)
    }

    /// Deserialize the state and add the values into self
    pub fn deserialize_into(&mut self, buf: &mut ReadBuffer<'_>) -> Result<()> {
        let count = buf.read_len().context(DecodeSnafu)?;
        for _ in 0..count {
            let bytes = buf.read_bytes(size_of::<T>()).context(DecodeSnafu)?;
            self.add(T::read_le(bytes))?;
        }
        Ok(())
    }

    /// Iterate the unique values, the order is unspecified
    pub fn finalize(&self) -> impl Iterator<Item = T> + '_ {
        self.set.iter().map(|&key| T::from_key(key))
    }

    /// Append the unique values as a list to the output
    pub fn take_into(&self, output: &mut ListArray) -> Result<()> {
        let elements = T::downcast_array_mut(output.elements_mut()).context(ArraySnafu)?;
        self.finalize().for_each(|value| elements.push(Some(value)));
        output.finish_list();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationError;
    use crate::common::io::DecodeError;
    use data_block::array::{Array, ArrayImpl};
    use data_block::types::LogicalType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn build<T: FixedWidthValue>(values: &[T]) -> FixedUniqState<T> {
        let mut state = FixedUniqState::new();
        values.iter().for_each(|&v| {
            state.add(v).unwrap();
        });
        state
    }

    fn sorted<T: FixedWidthValue + Ord>(state: &FixedUniqState<T>) -> Vec<T> {
        let mut values = state.finalize().collect::<Vec<_>>();
        values.sort_unstable();
        values
    }

    #[test]
    fn test_add_and_merge() {
        let mut state = build(&[1_i32, 2, 2, 3, 1]);
        assert_eq!(state.len(), 3);
        assert_eq!(sorted(&state), [1, 2, 3]);

        state.merge(&build(&[3, 4])).unwrap();
        assert_eq!(sorted(&state), [1, 2, 3, 4]);
    }

    #[test]
    fn test_round_trip() {
        let state = build(&[1_i64, 2, 2, 3, 1]);
        let mut out = Vec::new();
        state.serialize(&mut out);
        assert_eq!(out.len(), 1 + 3 * 8);

        let mut buf = ReadBuffer::new(&out);
        let decoded = FixedUniqState::<i64>::deserialize(&mut buf, None).unwrap();
        assert!(buf.is_exhausted());
        assert_eq!(sorted(&decoded), [1, 2, 3]);

        let empty = FixedUniqState::<u8>::new();
        let mut out = Vec::new();
        empty.serialize(&mut out);
        assert_eq!(out, [0]);
        let decoded = FixedUniqState::<u8>::deserialize(&mut ReadBuffer::new(&out), None).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_serialized_layout() {
        let state = build(&[0x0102_u16]);
        let mut out = Vec::new();
        state.serialize(&mut out);
        assert_eq!(out, [1, 0x02, 0x01]);
    }

    #[test]
    fn test_duplicates_collapse_on_deserialize() {
        // Count 3 with value 7 repeated
        let bytes = [3, 7, 7, 7];
        let state = FixedUniqState::<u8>::deserialize(&mut ReadBuffer::new(&bytes), None).unwrap();
        assert_eq!(state.finalize().collect::<Vec<_>>(), [7]);
    }

    #[test]
    fn test_malformed() {
        // Truncated count
        let error = FixedUniqState::<u32>::deserialize(&mut ReadBuffer::new(&[0x80]), None)
            .unwrap_err();
        assert!(matches!(error, AggregationError::Decode { .. }));

        // Truncated element
        let error =
            FixedUniqState::<u32>::deserialize(&mut ReadBuffer::new(&[2, 1, 0, 0, 0, 2]), None)
                .unwrap_err();
        assert!(matches!(
            error,
            AggregationError::Decode {
                source: DecodeError::UnexpectedEof {
                    needed: 4,
                    remaining: 1
                }
            }
        ));
        expect_test::expect!["Failed to decode the serialized aggregation state"]
            .assert_eq(&error.to_string());
    }

    #[test]
    fn test_float_normalize() {
        let state = build(&[0.0_f64, -0.0, f64::NAN, -f64::NAN, 1.5]);
        assert_eq!(state.len(), 3);
        let values = state.finalize().collect::<Vec<_>>();
        assert!(values.iter().any(|v| v.is_nan()));
        assert!(values.contains(&0.0));
        assert!(values.contains(&1.5));
    }

    #[test]
    fn test_max_size() {
        let mut state = FixedUniqState::<i32>::with_max_size(Some(2));
        for value in [5, 6, 7, 5, 8] {
            state.add(value).unwrap();
        }
        assert_eq!(sorted(&state), [5, 6]);

        state.merge(&build(&[9, 10])).unwrap();
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_take_into() {
        let mut output = ListArray::new(LogicalType::list(LogicalType::Integer)).unwrap();
        build(&[4_i32, 4]).take_into(&mut output).unwrap();
        FixedUniqState::<i32>::new().take_into(&mut output).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output.offsets(), &[0, 1, 1]);

        let mut wrong = ListArray::new(LogicalType::list(LogicalType::BigInt)).unwrap();
        let error = build(&[4_i32]).take_into(&mut wrong).unwrap_err();
        assert!(matches!(error, AggregationError::Array { .. }));
        assert!(matches!(wrong.elements(), ArrayImpl::Int64(array) if array.is_empty()));
    }

    macro_rules! round_trip_tests {
        ($({$variant:ident, $ty:ident}),*) => {
            $(
                paste::paste! {
                    #[test]
                    fn [<test_round_trip_ $ty>]() {
                        let state = build(&[0 as $ty, 1 as $ty, 1 as $ty, 100 as $ty]);
                        assert_eq!(state.len(), 3);

                        let mut out = Vec::new();
                        state.serialize(&mut out);
                        assert_eq!(out.len(), 1 + 3 * size_of::<$ty>());
                        let mut buf = ReadBuffer::new(&out);
                        let decoded = FixedUniqState::<$ty>::deserialize(&mut buf, None).unwrap();
                        assert!(buf.is_exhausted());

                        let mut output = ListArray::new(LogicalType::list(
                            <$ty as PrimitiveType>::LOGICAL_TYPE,
                        ))
                        .unwrap();
                        decoded.take_into(&mut output).unwrap();
                        assert!(matches!(
                            output.elements(),
                            ArrayImpl::$variant(array) if array.len() == 3
                        ));
                    }
                }
            )*
        };
    }

    crate::macros::for_all_fixed_width_types!(round_trip_tests);

    #[test]
    fn test_merge_is_union() {
        let mut rng = StdRng::seed_from_u64(42);
        let partitions = (0..3)
            .map(|_| {
                (0..200)
                    .map(|_| rng.gen_range(0..100_u64))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let expect = partitions
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let [a, b, c] = [0, 1, 2].map(|i| build(&partitions[i]));

        // (a ∪ b) ∪ c
        let mut left = build(&partitions[0]);
        left.merge(&b).unwrap();
        left.merge(&c).unwrap();

        // a ∪ (c ∪ b)
        let mut right = build(&partitions[2]);
        right.merge(&b).unwrap();
        let mut right_outer = build(&partitions[0]);
        right_outer.merge(&right).unwrap();

        // c ∪ a ∪ b
        let mut commuted = build(&partitions[2]);
        commuted.merge(&a).unwrap();
        commuted.merge(&b).unwrap();

        assert_eq!(sorted(&left), expect);
        assert_eq!(sorted(&right_outer), expect);
        assert_eq!(sorted(&commuted), expect);
    }
}
