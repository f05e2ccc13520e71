//! `groupUniqArray` over any value, the values are identified with bytes stored in the
//! [`Arena`]
//!
//! Two values are equal if their bytes are equal. For example, the float `0.0` and `-0.0`
//! are different values here

use std::fmt::Debug;
use std::marker::PhantomData;

use data_block::array::{ArrayImpl, ListArray};
use snafu::ResultExt;

use super::{AllocationSnafu, ArraySnafu, DecodeSnafu, GrowSetSnafu, Result};
use crate::common::arena::{Allocation, Arena};
use crate::common::hash_set::{GenericGrowth, UniqSet};
use crate::common::io::{write_length_prefixed, write_var_uint, ReadBuffer};

/// Policy that determines the bytes that identify a value
pub trait KeyPolicy: Debug + Send + Sync + 'static {
    /// Name of the policy
    const NAME: &'static str;

    /// Returns true if the policy views the value as its raw bytes in the array
    const IS_PLAIN: bool;

    /// Add the value at `row` of the `column` into the set, its key is stored in the
    /// arena only if the key is new. Returns true if the value is new
    fn add<'a>(
        set: &mut UniqSet<&'a [u8], GenericGrowth>,
        column: &ArrayImpl,
        row: usize,
        arena: &'a Arena,
    ) -> Result<bool>;

    /// Reconstruct the value from the key and append it to the output
    fn append(key: &[u8], output: &mut ArrayImpl) -> Result<()>;
}

/// The value occupies a continuous memory region in the array, its raw bytes are the key.
/// For example, string and numbers
#[derive(Debug)]
pub struct Plain;

/// The value is serialized into the key. It works for any value, for example list
#[derive(Debug)]
pub struct Serialized;

impl KeyPolicy for Plain {
    const NAME: &'static str = "Plain";
    const IS_PLAIN: bool = true;

    fn add<'a>(
        set: &mut UniqSet<&'a [u8], GenericGrowth>,
        column: &ArrayImpl,
        row: usize,
        arena: &'a Arena,
    ) -> Result<bool> {
        let view = column.raw_bytes(row).context(ArraySnafu)?;
        let hash = set.hash_of(view);
        if set.find_hashed(hash, |key| *key == view).is_some() {
            return Ok(false);
        }

        set.try_reserve_one().context(GrowSetSnafu)?;
        let key = arena.store(view).context(AllocationSnafu)?;
        set.insert_unique_hashed(hash, key);
        Ok(true)
    }

    fn append(key: &[u8], output: &mut ArrayImpl) -> Result<()> {
        output.append_raw_bytes(key).context(ArraySnafu)
    }
}

impl KeyPolicy for Serialized {
    const NAME: &'static str = "Serialized";
    const IS_PLAIN: bool = false;

    fn add<'a>(
        set: &mut UniqSet<&'a [u8], GenericGrowth>,
        column: &ArrayImpl,
        row: usize,
        arena: &'a Arena,
    ) -> Result<bool> {
        let size = column.serialized_size(row);
        let mut candidate = arena.alloc(size).context(AllocationSnafu)?;
        column.serialize_row(row, candidate.as_mut_slice());
        insert_candidate(set, candidate, arena)
    }

    fn append(key: &[u8], output: &mut ArrayImpl) -> Result<()> {
        output.append_from_serialized(key).context(ArraySnafu)?;
        Ok(())
    }
}

/// Insert the key that has been allocated in the arena, the allocation is rolled back if
/// the key exists. Nothing should be allocated in the arena after the candidate
fn insert_candidate<'a>(
    set: &mut UniqSet<&'a [u8], GenericGrowth>,
    candidate: Allocation<'a>,
    arena: &'a Arena,
) -> Result<bool> {
    let hash = set.hash_of(candidate.as_slice());
    if set
        .find_hashed(hash, |key| *key == candidate.as_slice())
        .is_some()
    {
        arena.rollback(candidate);
        return Ok(false);
    }

    if let Err(e) = set.try_reserve_one() {
        arena.rollback(candidate);
        return Err(e).context(GrowSetSnafu);
    }
    set.insert_unique_hashed(hash, candidate.keep());
    Ok(true)
}

/// State of the `groupUniqArray` whose argument can be any type. Keys are stored in the
/// arena that outlives the state
#[derive(Debug)]
pub struct GenericUniqState<'a, P> {
    set: UniqSet<&'a [u8], GenericGrowth>,
    max_size: usize,
    _policy: PhantomData<P>,
}

impl<P: KeyPolicy> Default for GenericUniqState<'_, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P: KeyPolicy> GenericUniqState<'a, P> {
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
            _policy: PhantomData,
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

    #[inline]
    fn is_full(&self) -> bool {
        self.set.len() >= self.max_size
    }

    /// Add the value at `row` of the `column`, returns true if the value is new. Caller
    /// should guarantee the value is not `NULL`
    #[inline]
    pub fn add(&mut self, column: &ArrayImpl, row: usize, arena: &'a Arena) -> Result<bool> {
        if self.is_full() {
            return Ok(false);
        }
        P::add(&mut self.set, column, row, arena)
    }

    /// Merge the values in other state into self. New keys are copied into the `arena`,
    /// self never references the arena of other state
    pub fn merge(&mut self, other: &GenericUniqState<'_, P>, arena: &'a Arena) -> Result<()> {
        for (hash, &key) in other.set.iter_hashed() {
            if self.is_full() {
                break;
            }
            if self.set.find_hashed(hash, |k| *k == key).is_some() {
                continue;
            }
            self.set.try_reserve_one().context(GrowSetSnafu)?;
            let copied = arena.store(key).context(AllocationSnafu)?;
            self.set.insert_unique_hashed(hash, copied);
        }
        Ok(())
    }

    /// Serialize the state: var uint count, then length-prefixed keys
    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_var_uint(self.set.len() as u64, out);
        for key in self.set.iter() {
            write_length_prefixed(key, out);
        }
    }

    /// Deserialize the state written by [`Self::serialize`]
    pub fn deserialize(
        buf: &mut ReadBuffer<'_>,
        arena: &'a Arena,
        max_size: Option<usize>,
    ) -> Result<Self> {
        let mut state = Self::with_max_size(max_size);
        state.deserialize_into(buf, arena)?;
        Ok(state)
    }

    /// Deserialize the state and add the keys into self. Keys are copied into the arena
    pub fn deserialize_into(&mut self, buf: &mut ReadBuffer<'_>, arena: &'a Arena) -> Result<()> {
        let count = buf.read_len().context(DecodeSnafu)?;
        for _ in 0..count {
            let bytes = buf.read_length_prefixed().context(DecodeSnafu)?;
            if self.is_full() {
                // Consume the remaining keys
                continue;
            }
            let candidate = arena.insert(bytes).context(AllocationSnafu)?;
            insert_candidate(&mut self.set, candidate, arena)?;
        }
        Ok(())
    }

    /// Iterate the keys in the state, the order is unspecified
    pub fn keys(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.set.iter().copied()
    }

    /// Reconstruct the unique values and append them as a list to the output. If a key
    /// can not be reconstructed, the output is left unchanged
    pub fn take_into(&self, output: &mut ListArray) -> Result<()> {
        let elements = output.elements_mut();
        let len = elements.len();
        let result = self
            .set
            .iter()
            .try_for_each(|key| P::append(key, elements));
        if result.is_err() {
            elements.truncate(len);
            return result;
        }
        output.finish_list();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationError;
    use crate::common::io::DecodeError;
    use data_block::array::{Array, ArrayError, BinaryArray, Int32Array, ScalarRef};
    use data_block::types::LogicalType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    const STRINGS: [&str; 6] = ["a", "b", "a", "c", "b", "a"];

    fn add_all<'a, P: KeyPolicy>(
        state: &mut GenericUniqState<'a, P>,
        column: &ArrayImpl,
        arena: &'a Arena,
    ) {
        (0..column.len()).for_each(|row| {
            state.add(column, row, arena).unwrap();
        });
    }

    fn sorted_keys<P: KeyPolicy>(state: &GenericUniqState<'_, P>) -> Vec<Vec<u8>> {
        let mut keys = state.keys().map(|key| key.to_vec()).collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    fn finalize_strings<P: KeyPolicy>(state: &GenericUniqState<'_, P>) -> Vec<String> {
        let mut output = ListArray::new(LogicalType::list(LogicalType::VarChar)).unwrap();
        state.take_into(&mut output).unwrap();
        let mut values = output
            .value(0)
            .iter()
            .map(|value| match value {
                Some(ScalarRef::Binary(bytes)) => String::from_utf8(bytes.to_vec()).unwrap(),
                other => panic!("Unexpected value: {other:?}"),
            })
            .collect::<Vec<_>>();
        values.sort_unstable();
        values
    }

    #[test]
    fn test_plain_arena_budget() {
        let column = ArrayImpl::from(BinaryArray::from_strs(STRINGS));
        let arena = Arena::new();
        let mut state = GenericUniqState::<Plain>::new();
        add_all(&mut state, &column, &arena);

        assert_eq!(state.len(), 3);
        // Only the new keys are copied into the arena
        assert_eq!(arena.used_bytes(), 3);
        assert_eq!(finalize_strings(&state), ["a", "b", "c"]);
    }

    #[test]
    fn test_serialized_arena_budget() {
        let column = ArrayImpl::from(BinaryArray::from_strs(STRINGS));
        let arena = Arena::new();
        let mut state = GenericUniqState::<Serialized>::new();
        add_all(&mut state, &column, &arena);

        assert_eq!(state.len(), 3);
        // Duplicates are rolled back, each kept key is length prefix plus one byte
        assert_eq!(arena.used_bytes(), 6);
        assert_eq!(sorted_keys(&state), [b"\x01a", b"\x01b", b"\x01c"]);
        assert_eq!(finalize_strings(&state), ["a", "b", "c"]);
    }

    #[test]
    fn test_plain_and_serialized_are_equivalent() {
        let column = ArrayImpl::from(BinaryArray::from_strs(["x", "", "yz", "x", ""]));
        let plain_arena = Arena::new();
        let mut plain = GenericUniqState::<Plain>::new();
        add_all(&mut plain, &column, &plain_arena);

        let serialized_arena = Arena::new();
        let mut serialized = GenericUniqState::<Serialized>::new();
        add_all(&mut serialized, &column, &serialized_arena);

        assert_eq!(plain.len(), 3);
        assert_eq!(finalize_strings(&plain), finalize_strings(&serialized));
    }

    #[test]
    fn test_plain_numbers() {
        let column = ArrayImpl::from(Int32Array::from_values_iter([7, -1, 7]));
        let arena = Arena::new();
        let mut state = GenericUniqState::<Plain>::new();
        add_all(&mut state, &column, &arena);
        assert_eq!(arena.used_bytes(), 8);

        let mut output = ListArray::new(LogicalType::list(LogicalType::Integer)).unwrap();
        state.take_into(&mut output).unwrap();
        let mut values = output
            .value(0)
            .iter()
            .map(|value| match value {
                Some(ScalarRef::Int32(v)) => v,
                other => panic!("Unexpected value: {other:?}"),
            })
            .collect::<Vec<_>>();
        values.sort_unstable();
        assert_eq!(values, [-1, 7]);
    }

    #[test]
    fn test_serialized_lists() {
        let mut lists = ListArray::new(LogicalType::list(LogicalType::Integer)).unwrap();
        for list in [vec![Some(1), None], vec![], vec![Some(1), None], vec![Some(2)]] {
            let elements: &mut Int32Array = lists.elements_mut().try_into().unwrap();
            list.into_iter().for_each(|v| elements.push(v));
            lists.finish_list();
        }
        let column = ArrayImpl::from(lists);

        let arena = Arena::new();
        let mut state = GenericUniqState::<Serialized>::new();
        add_all(&mut state, &column, &arena);
        assert_eq!(state.len(), 3);

        // Plain policy can not view the list as bytes
        let mut plain = GenericUniqState::<Plain>::new();
        assert!(matches!(
            plain.add(&column, 0, &arena),
            Err(AggregationError::Array { .. })
        ));

        let mut output = ListArray::new(LogicalType::list(LogicalType::list(
            LogicalType::Integer,
        )))
        .unwrap();
        state.take_into(&mut output).unwrap();
        let finalized = output.value(0);
        assert_eq!(finalized.len(), 3);
        let column_values = (0..column.len())
            .map(|row| column.get(row))
            .collect::<Vec<_>>();
        assert!(finalized.iter().all(|value| column_values.contains(&value)));
    }

    #[test]
    fn test_merge_copies_into_own_arena() {
        let arena = Arena::new();
        let mut state = GenericUniqState::<Plain>::new();
        add_all(
            &mut state,
            &ArrayImpl::from(BinaryArray::from_strs(["a", "b"])),
            &arena,
        );

        {
            let other_arena = Arena::new();
            let mut other = GenericUniqState::<Plain>::new();
            add_all(
                &mut other,
                &ArrayImpl::from(BinaryArray::from_strs(["b", "cd"])),
                &other_arena,
            );
            state.merge(&other, &arena).unwrap();
        }

        // The other arena has been dropped
        assert_eq!(arena.used_bytes(), 4);
        assert_eq!(finalize_strings(&state), ["a", "b", "cd"]);
    }

    #[test]
    fn test_round_trip() {
        let arena = Arena::new();
        let mut state = GenericUniqState::<Plain>::new();
        add_all(
            &mut state,
            &ArrayImpl::from(BinaryArray::from_strs(STRINGS)),
            &arena,
        );
        let mut out = Vec::new();
        state.serialize(&mut out);
        assert_eq!(out.len(), 1 + 3 * 2);

        let decoded_arena = Arena::new();
        let mut buf = ReadBuffer::new(&out);
        let decoded = GenericUniqState::<Plain>::deserialize(&mut buf, &decoded_arena, None).unwrap();
        assert!(buf.is_exhausted());
        assert_eq!(sorted_keys(&decoded), sorted_keys(&state));
        assert_eq!(decoded_arena.used_bytes(), 3);

        let empty = GenericUniqState::<Serialized>::new();
        let mut out = Vec::new();
        empty.serialize(&mut out);
        let decoded =
            GenericUniqState::<Serialized>::deserialize(&mut ReadBuffer::new(&out), &arena, None)
                .unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_deserialize_rolls_back_duplicates() {
        // Three keys, "ab" is repeated
        let bytes = [3, 2, b'a', b'b', 1, b'c', 2, b'a', b'b'];
        let arena = Arena::new();
        let state =
            GenericUniqState::<Plain>::deserialize(&mut ReadBuffer::new(&bytes), &arena, None)
                .unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(arena.used_bytes(), 3);
    }

    #[test]
    fn test_malformed() {
        let arena = Arena::new();
        // Truncated string
        let error =
            GenericUniqState::<Plain>::deserialize(&mut ReadBuffer::new(&[1, 5, b'a']), &arena, None)
                .unwrap_err();
        assert!(matches!(
            error,
            AggregationError::Decode {
                source: DecodeError::UnexpectedEof {
                    needed: 5,
                    remaining: 1
                }
            }
        ));

        // Truncated count
        assert!(
            GenericUniqState::<Plain>::deserialize(&mut ReadBuffer::new(&[]), &arena, None)
                .is_err()
        );
        // Missing key
        assert!(
            GenericUniqState::<Plain>::deserialize(&mut ReadBuffer::new(&[2, 0]), &arena, None)
                .is_err()
        );
    }

    #[test]
    fn test_take_into_malformed_key() {
        let arena = Arena::new();
        let mut state = GenericUniqState::<Serialized>::new();
        add_all(
            &mut state,
            &ArrayImpl::from(BinaryArray::from_strs(["x", "y"])),
            &arena,
        );
        let mut output = ListArray::new(LogicalType::list(LogicalType::VarChar)).unwrap();
        state.take_into(&mut output).unwrap();

        // "a", "b", "c" and a key that claims 9 bytes but only has 1
        let bytes = [4, 2, 1, b'a', 2, 1, b'b', 2, 1, b'c', 2, 9, b'x'];
        let malformed =
            GenericUniqState::<Serialized>::deserialize(&mut ReadBuffer::new(&bytes), &arena, None)
                .unwrap();
        assert_eq!(malformed.len(), 4);
        let error = malformed.take_into(&mut output).unwrap_err();
        assert!(matches!(
            error,
            AggregationError::Array {
                source: ArrayError::TruncatedValue { .. }
            }
        ));
        assert_eq!(output.len(), 1);
        assert_eq!(output.offsets(), &[0, 2]);
        assert_eq!(output.elements().len(), 2);

        state.take_into(&mut output).unwrap();
        assert_eq!(output.offsets(), &[0, 2, 4]);
        assert_eq!(output.value(1).len(), 2);
    }

    #[test]
    fn test_max_size() {
        let arena = Arena::new();
        let mut state = GenericUniqState::<Serialized>::with_max_size(Some(2));
        add_all(
            &mut state,
            &ArrayImpl::from(BinaryArray::from_strs(["c", "a", "b", "a"])),
            &arena,
        );
        assert_eq!(state.len(), 2);
        assert_eq!(arena.used_bytes(), 4);

        // Full state still consumes all of the serialized keys
        let bytes = [2, 1, b'x', 1, b'y', 9];
        let mut buf = ReadBuffer::new(&bytes);
        state.deserialize_into(&mut buf, &arena).unwrap();
        assert_eq!(buf.remaining(), 1);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_merge_is_union() {
        let mut rng = StdRng::seed_from_u64(7);
        let columns = (0..3)
            .map(|_| {
                let strings = (0..100)
                    .map(|_| {
                        let len = rng.gen_range(0..4);
                        (0..len)
                            .map(|_| rng.gen_range(b'a'..=b'c') as char)
                            .collect::<String>()
                    })
                    .collect::<Vec<_>>();
                ArrayImpl::from(BinaryArray::from_strs(strings.iter().map(String::as_str)))
            })
            .collect::<Vec<_>>();
        let expect = columns
            .iter()
            .flat_map(|column| {
                (0..column.len()).map(move |row| column.raw_bytes(row).unwrap().to_vec())
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let arenas = [Arena::new(), Arena::new(), Arena::new()];
        let states = columns
            .iter()
            .zip(&arenas)
            .map(|(column, arena)| {
                let mut state = GenericUniqState::<Serialized>::new();
                add_all(&mut state, column, arena);
                state
            })
            .collect::<Vec<_>>();

        let arena = Arena::new();
        let mut forward = GenericUniqState::<Serialized>::new();
        states
            .iter()
            .for_each(|state| forward.merge(state, &arena).unwrap());
        let mut backward = GenericUniqState::<Serialized>::new();
        states
            .iter()
            .rev()
            .for_each(|state| backward.merge(state, &arena).unwrap());

        assert_eq!(sorted_keys(&forward), sorted_keys(&backward));
        let finalized = finalize_strings(&forward)
            .into_iter()
            .map(String::into_bytes)
            .collect::<Vec<_>>();
        assert_eq!(finalized, expect);
    }
}
