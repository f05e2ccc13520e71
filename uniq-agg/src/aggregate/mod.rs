//! Aggregate functions that collect the unique values of each group into a list
//!
//! The function objects check the argument, create the states and update/combine/take the
//! states of many groups in batch. The states themselves live in [`uniq_fixed`] and
//! [`uniq_generic`]

pub mod uniq_fixed;
pub mod uniq_generic;

use std::fmt::{Debug, Display};
use std::marker::PhantomData;

use data_block::array::{Array, ArrayError, ArrayImpl, ListArray};
use data_block::types::{LogicalType, PhysicalType};
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use self::uniq_fixed::{FixedUniqState, FixedWidthValue};
use self::uniq_generic::{GenericUniqState, KeyPolicy, Plain, Serialized};
use crate::common::arena::{Arena, ArenaError};
use crate::common::hash_set::HashSetError;
use crate::common::io::{DecodeError, ReadBuffer};
use crate::macros::for_all_fixed_width_types;

/// Name of the aggregation function
const NAME: &str = "groupUniqArray";

/// Historical cap on the number of unique values in a group. It is not enforced unless
/// it is passed as the `max_size` of the function
pub const DEFAULT_MAX_SIZE: usize = 0xFF_FFFF;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AggregationError {
    #[snafu(display(
        "`{func}` aggregation function expect `{}`, however the arg has logical type `{:?}` with `{}`",
        expect_physical_type,
        arg_type,
        arg_type.physical_type()
    ))]
    ArgTypeMismatch {
        func: &'static str,
        expect_physical_type: PhysicalType,
        arg_type: LogicalType,
    },
    #[snafu(display(
        "`{func}` aggregation function can not view the arg with logical type `{:?}` as raw bytes",
        arg_type
    ))]
    NotPlainType {
        func: &'static str,
        arg_type: LogicalType,
    },
    #[snafu(display("`max_size` of the `{func}` aggregation function should be positive"))]
    InvalidMaxSize { func: &'static str },
    #[snafu(display(
        "`{func}` aggregation function stores the values in arena, however the arena is not provided"
    ))]
    ArenaRequired { func: &'static str },
    #[snafu(display("Failed to decode the serialized aggregation state"))]
    Decode { source: DecodeError },
    #[snafu(display("Failed to allocate memory for the aggregation state"))]
    Allocation { source: ArenaError },
    #[snafu(display("Failed to grow the set of the aggregation state"))]
    GrowSet { source: HashSetError },
    #[snafu(display("Array error in the aggregation state"))]
    Array { source: ArrayError },
    #[snafu(display("`{func}` expect `{expect}` {what}, found `{actual}`"))]
    StatesLengthMismatch {
        func: &'static str,
        what: &'static str,
        expect: usize,
        actual: usize,
    },
    #[snafu(display("`{func}` has `{num_states}` states, group `{group}` out of range"))]
    GroupOutOfRange {
        func: &'static str,
        group: usize,
        num_states: usize,
    },
    #[snafu(display("`{function}` function can not process the `{states}` states"))]
    StatesTypeMismatch {
        function: &'static str,
        states: &'static str,
    },
}

/// Aggregation result
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Signature of the function
pub trait Function: Debug + Send + Sync {
    /// Name of the function
    fn name(&self) -> &'static str {
        NAME
    }

    /// Argument of the function
    fn argument(&self) -> &LogicalType;

    /// Return type of the function, list of the argument
    fn return_type(&self) -> LogicalType {
        LogicalType::list(self.argument().clone())
    }

    /// Returns true if the states store the values in the arena. Caller should provide
    /// the arena when it updates, combines and deserializes the states
    fn allocates_memory_in_arena(&self) -> bool;
}

/// Trait for the `groupUniqArray` functions
///
/// The states are indexed by group: `group_ids[row]` is the index of the state that the
/// `row` of the payload should update. The states of the function that
/// [allocates memory in arena] borrow the arena, the arena should outlive them
///
/// [allocates memory in arena]: Function::allocates_memory_in_arena
pub trait UniqArrayFunction: Function {
    /// State of a group
    type State<'a>: Debug;

    /// Maximal number of unique values in a state
    fn max_size(&self) -> Option<usize>;

    /// Create an empty state
    fn init_state<'a>(&self) -> Self::State<'a>;

    /// Update the states with the payload, `NULL`s in the payload are ignored
    fn update_states<'a>(
        &self,
        payload: &ArrayImpl,
        group_ids: &[usize],
        states: &mut [Self::State<'a>],
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Combine the partial(thread-local) states into the combined states, `partial[i]`
    /// is merged into `combined[i]`
    fn combine_states<'a>(
        &self,
        partial: &[Self::State<'_>],
        combined: &mut [Self::State<'a>],
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Serialize the states one by one
    fn serialize_states(&self, states: &[Self::State<'_>], out: &mut Vec<u8>);

    /// Deserialize the states written by [`Self::serialize_states`] and add them into
    /// the `states`
    fn deserialize_states<'a>(
        &self,
        buf: &mut ReadBuffer<'_>,
        states: &mut [Self::State<'a>],
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Write the unique values of each state as a list into the output, output should
    /// be a [`ListArray`] of the argument
    fn take_states(&self, states: &[Self::State<'_>], output: &mut ArrayImpl) -> Result<()>;
}

#[inline]
fn check_payload(func: &dyn Function, payload: &ArrayImpl, group_ids: &[usize]) -> Result<()> {
    let arg_type = payload.logical_type();
    ensure!(
        arg_type.physical_type() == func.argument().physical_type(),
        ArgTypeMismatchSnafu {
            func: func.name(),
            expect_physical_type: func.argument().physical_type(),
            arg_type: arg_type.clone(),
        }
    );
    ensure!(
        payload.len() == group_ids.len(),
        StatesLengthMismatchSnafu {
            func: func.name(),
            what: "group ids",
            expect: payload.len(),
            actual: group_ids.len(),
        }
    );
    Ok(())
}

#[inline]
fn check_states_len(expect: usize, actual: usize) -> Result<()> {
    ensure!(
        expect == actual,
        StatesLengthMismatchSnafu {
            func: NAME,
            what: "combined states",
            expect,
            actual,
        }
    );
    Ok(())
}

#[inline]
fn state_of<S>(states: &mut [S], group: usize) -> Result<&mut S> {
    let num_states = states.len();
    states.get_mut(group).context(GroupOutOfRangeSnafu {
        func: NAME,
        group,
        num_states,
    })
}

#[inline]
fn list_output(output: &mut ArrayImpl) -> Result<&mut ListArray> {
    output.try_into().context(ArraySnafu)
}

#[inline]
fn check_max_size(max_size: Option<usize>) -> Result<()> {
    ensure!(max_size != Some(0), InvalidMaxSizeSnafu { func: NAME });
    Ok(())
}

/// `groupUniqArray` whose argument is fixed width value
#[derive(Debug)]
pub struct GroupUniqArrayFixed<T> {
    arg: LogicalType,
    max_size: Option<usize>,
    _phantom: PhantomData<T>,
}

impl<T: FixedWidthValue> GroupUniqArrayFixed<T> {
    /// Try to create a new [`GroupUniqArrayFixed`], `max_size` limits the number of
    /// unique values in each group
    pub fn try_new(arg: LogicalType, max_size: Option<usize>) -> Result<Self> {
        ensure!(
            arg.physical_type() == T::PHYSICAL_TYPE,
            ArgTypeMismatchSnafu {
                func: NAME,
                expect_physical_type: T::PHYSICAL_TYPE,
                arg_type: arg,
            }
        );
        check_max_size(max_size)?;
        Ok(Self {
            arg,
            max_size,
            _phantom: PhantomData,
        })
    }
}

impl<T: FixedWidthValue> Function for GroupUniqArrayFixed<T> {
    fn argument(&self) -> &LogicalType {
        &self.arg
    }

    fn allocates_memory_in_arena(&self) -> bool {
        false
    }
}

impl<T: FixedWidthValue> UniqArrayFunction for GroupUniqArrayFixed<T> {
    type State<'a> = FixedUniqState<T>;

    fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    fn init_state<'a>(&self) -> Self::State<'a> {
        FixedUniqState::with_max_size(self.max_size)
    }

    fn update_states(
        &self,
        payload: &ArrayImpl,
        group_ids: &[usize],
        states: &mut [FixedUniqState<T>],
        _arena: Option<&Arena>,
    ) -> Result<()> {
        check_payload(self, payload, group_ids)?;
        let array = T::downcast_array(payload).context(ArraySnafu)?;
        let values = array.values();
        let validity = array.validity();
        if validity.is_empty() {
            values
                .iter()
                .zip(group_ids)
                .try_for_each(|(&value, &group)| state_of(states, group)?.add(value).map(|_| ()))
        } else {
            values
                .iter()
                .zip(validity)
                .zip(group_ids)
                .try_for_each(|((&value, &valid), &group)| {
                    if valid {
                        state_of(states, group)?.add(value)?;
                    }
                    Ok(())
                })
        }
    }

    fn combine_states(
        &self,
        partial: &[FixedUniqState<T>],
        combined: &mut [FixedUniqState<T>],
        _arena: Option<&Arena>,
    ) -> Result<()> {
        check_states_len(partial.len(), combined.len())?;
        partial
            .iter()
            .zip(combined.iter_mut())
            .try_for_each(|(partial, combined)| combined.merge(partial))?;
        tracing::debug!(func = NAME, states = partial.len(), "Combine fixed width states");
        Ok(())
    }

    fn serialize_states(&self, states: &[FixedUniqState<T>], out: &mut Vec<u8>) {
        let start = out.len();
        states.iter().for_each(|state| state.serialize(out));
        tracing::debug!(
            func = NAME,
            states = states.len(),
            bytes = out.len() - start,
            "Serialize fixed width states"
        );
    }

    fn deserialize_states(
        &self,
        buf: &mut ReadBuffer<'_>,
        states: &mut [FixedUniqState<T>],
        _arena: Option<&Arena>,
    ) -> Result<()> {
        states
            .iter_mut()
            .try_for_each(|state| state.deserialize_into(buf))?;
        tracing::debug!(
            func = NAME,
            states = states.len(),
            "Deserialize fixed width states"
        );
        Ok(())
    }

    fn take_states(&self, states: &[FixedUniqState<T>], output: &mut ArrayImpl) -> Result<()> {
        let output = list_output(output)?;
        states
            .iter()
            .try_for_each(|state| state.take_into(output))?;
        tracing::debug!(func = NAME, states = states.len(), "Take fixed width states");
        Ok(())
    }
}

/// `groupUniqArray` whose argument can be any type, the values are stored in the arena
/// with the key policy `P`
#[derive(Debug)]
pub struct GroupUniqArrayGeneric<P> {
    arg: LogicalType,
    max_size: Option<usize>,
    _phantom: PhantomData<P>,
}

impl<P: KeyPolicy> GroupUniqArrayGeneric<P> {
    /// Try to create a new [`GroupUniqArrayGeneric`], `max_size` limits the number of
    /// unique values in each group
    pub fn try_new(arg: LogicalType, max_size: Option<usize>) -> Result<Self> {
        if P::IS_PLAIN {
            ensure!(
                arg.physical_type().is_value_contiguous(),
                NotPlainTypeSnafu {
                    func: NAME,
                    arg_type: arg,
                }
            );
        }
        check_max_size(max_size)?;
        Ok(Self {
            arg,
            max_size,
            _phantom: PhantomData,
        })
    }
}

impl<P: KeyPolicy> Function for GroupUniqArrayGeneric<P> {
    fn argument(&self) -> &LogicalType {
        &self.arg
    }

    fn allocates_memory_in_arena(&self) -> bool {
        true
    }
}

impl<P: KeyPolicy> UniqArrayFunction for GroupUniqArrayGeneric<P> {
    type State<'a> = GenericUniqState<'a, P>;

    fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    fn init_state<'a>(&self) -> GenericUniqState<'a, P> {
        GenericUniqState::with_max_size(self.max_size)
    }

    fn update_states<'a>(
        &self,
        payload: &ArrayImpl,
        group_ids: &[usize],
        states: &mut [GenericUniqState<'a, P>],
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: NAME })?;
        check_payload(self, payload, group_ids)?;
        group_ids
            .iter()
            .enumerate()
            .try_for_each(|(row, &group)| {
                if payload.is_valid(row) {
                    state_of(states, group)?.add(payload, row, arena)?;
                }
                Ok(())
            })
    }

    fn combine_states<'a>(
        &self,
        partial: &[GenericUniqState<'_, P>],
        combined: &mut [GenericUniqState<'a, P>],
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: NAME })?;
        check_states_len(partial.len(), combined.len())?;
        partial
            .iter()
            .zip(combined.iter_mut())
            .try_for_each(|(partial, combined)| combined.merge(partial, arena))?;
        tracing::debug!(
            func = NAME,
            policy = P::NAME,
            states = partial.len(),
            arena_used_bytes = arena.used_bytes(),
            "Combine generic states"
        );
        Ok(())
    }

    fn serialize_states(&self, states: &[GenericUniqState<'_, P>], out: &mut Vec<u8>) {
        let start = out.len();
        states.iter().for_each(|state| state.serialize(out));
        tracing::debug!(
            func = NAME,
            policy = P::NAME,
            states = states.len(),
            bytes = out.len() - start,
            "Serialize generic states"
        );
    }

    fn deserialize_states<'a>(
        &self,
        buf: &mut ReadBuffer<'_>,
        states: &mut [GenericUniqState<'a, P>],
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: NAME })?;
        states
            .iter_mut()
            .try_for_each(|state| state.deserialize_into(buf, arena))?;
        tracing::debug!(
            func = NAME,
            policy = P::NAME,
            states = states.len(),
            arena_used_bytes = arena.used_bytes(),
            "Deserialize generic states"
        );
        Ok(())
    }

    fn take_states(
        &self,
        states: &[GenericUniqState<'_, P>],
        output: &mut ArrayImpl,
    ) -> Result<()> {
        let output = list_output(output)?;
        states
            .iter()
            .try_for_each(|state| state.take_into(output))?;
        tracing::debug!(
            func = NAME,
            policy = P::NAME,
            states = states.len(),
            "Take generic states"
        );
        Ok(())
    }
}

macro_rules! group_uniq_array {
    ($({$variant:ident, $func:ty}),+) => {
        /// `groupUniqArray` function whose state is chosen by the argument type, enum
        /// dispatch. Create it with [`create_group_uniq_array`]
        #[derive(Debug)]
        pub enum GroupUniqArray {
            $(
                #[doc = concat!("Function of the `", stringify!($variant), "` states")]
                $variant($func)
            ),+
        }

        /// States of the groups that are created by [`GroupUniqArray::init_states`]
        #[derive(Debug)]
        pub enum UniqStates<'a> {
            $(
                #[doc = concat!("States of the `", stringify!($variant), "` function")]
                $variant(Vec<<$func as UniqArrayFunction>::State<'a>>)
            ),+
        }

        impl UniqStates<'_> {
            /// Number of states
            pub fn len(&self) -> usize {
                match self {
                    $(
                        Self::$variant(states) => states.len(),
                    )+
                }
            }

            /// Returns true if there is no state
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Get ident of the states
            pub fn ident(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                }
            }
        }

        impl GroupUniqArray {
            /// Get ident of the function
            pub fn ident(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                }
            }

            /// View the function as its signature
            pub fn function(&self) -> &dyn Function {
                match self {
                    $(
                        Self::$variant(func) => func,
                    )+
                }
            }

            /// Create `len` empty states
            pub fn init_states<'a>(&self, len: usize) -> UniqStates<'a> {
                match self {
                    $(
                        Self::$variant(func) => {
                            UniqStates::$variant((0..len).map(|_| func.init_state()).collect())
                        }
                    )+
                }
            }

            /// Update the states with the payload, see [`UniqArrayFunction::update_states`]
            pub fn update_states<'a>(
                &self,
                payload: &ArrayImpl,
                group_ids: &[usize],
                states: &mut UniqStates<'a>,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, states) {
                    $(
                        (Self::$variant(func), UniqStates::$variant(states)) => {
                            func.update_states(payload, group_ids, states, arena)
                        }
                    )+
                    (func, states) => StatesTypeMismatchSnafu {
                        function: func.ident(),
                        states: states.ident(),
                    }
                    .fail(),
                }
            }

            /// Combine the partial states into combined states, see
            /// [`UniqArrayFunction::combine_states`]
            pub fn combine_states<'a>(
                &self,
                partial: &UniqStates<'_>,
                combined: &mut UniqStates<'a>,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, partial, combined) {
                    $(
                        (
                            Self::$variant(func),
                            UniqStates::$variant(partial),
                            UniqStates::$variant(combined),
                        ) => func.combine_states(partial, combined, arena),
                    )+
                    (func, partial, _) => StatesTypeMismatchSnafu {
                        function: func.ident(),
                        states: partial.ident(),
                    }
                    .fail(),
                }
            }

            /// Serialize the states one by one
            pub fn serialize_states(&self, states: &UniqStates<'_>, out: &mut Vec<u8>) -> Result<()> {
                match (self, states) {
                    $(
                        (Self::$variant(func), UniqStates::$variant(states)) => {
                            func.serialize_states(states, out);
                            Ok(())
                        }
                    )+
                    (func, states) => StatesTypeMismatchSnafu {
                        function: func.ident(),
                        states: states.ident(),
                    }
                    .fail(),
                }
            }

            /// Deserialize the states written by [`Self::serialize_states`]
            pub fn deserialize_states<'a>(
                &self,
                buf: &mut ReadBuffer<'_>,
                states: &mut UniqStates<'a>,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, states) {
                    $(
                        (Self::$variant(func), UniqStates::$variant(states)) => {
                            func.deserialize_states(buf, states, arena)
                        }
                    )+
                    (func, states) => StatesTypeMismatchSnafu {
                        function: func.ident(),
                        states: states.ident(),
                    }
                    .fail(),
                }
            }

            /// Write the unique values of each state as a list into the output
            pub fn take_states(&self, states: &UniqStates<'_>, output: &mut ArrayImpl) -> Result<()> {
                match (self, states) {
                    $(
                        (Self::$variant(func), UniqStates::$variant(states)) => {
                            func.take_states(states, output)
                        }
                    )+
                    (func, states) => StatesTypeMismatchSnafu {
                        function: func.ident(),
                        states: states.ident(),
                    }
                    .fail(),
                }
            }
        }
    };
}

group_uniq_array! {
    {Int8, GroupUniqArrayFixed<i8>},
    {UInt8, GroupUniqArrayFixed<u8>},
    {Int16, GroupUniqArrayFixed<i16>},
    {UInt16, GroupUniqArrayFixed<u16>},
    {Int32, GroupUniqArrayFixed<i32>},
    {UInt32, GroupUniqArrayFixed<u32>},
    {Int64, GroupUniqArrayFixed<i64>},
    {UInt64, GroupUniqArrayFixed<u64>},
    {Int128, GroupUniqArrayFixed<i128>},
    {Float32, GroupUniqArrayFixed<f32>},
    {Float64, GroupUniqArrayFixed<f64>},
    {Plain, GroupUniqArrayGeneric<Plain>},
    {Serialized, GroupUniqArrayGeneric<Serialized>}
}

impl Display for GroupUniqArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let func = self.function();
        write!(
            f,
            "fn {}({:?}) -> {:?}",
            func.name(),
            func.argument(),
            func.return_type()
        )
    }
}

/// Create the `groupUniqArray` function based on the argument type
///
/// - Fixed width numbers use the [`FixedUniqState`]
/// - `VARCHAR`/`VARBINARY` use the [`GenericUniqState`] with [`Plain`] keys
/// - Other types use the [`GenericUniqState`] with [`Serialized`] keys
pub fn create_group_uniq_array(arg: LogicalType, max_size: Option<usize>) -> Result<GroupUniqArray> {
    macro_rules! create {
        ($({$variant:ident, $ty:ty}),*) => {
            match arg.physical_type() {
                $(
                    PhysicalType::$variant => {
                        GroupUniqArrayFixed::<$ty>::try_new(arg, max_size).map(GroupUniqArray::$variant)
                    }
                )*
                PhysicalType::Binary => {
                    GroupUniqArrayGeneric::<Plain>::try_new(arg, max_size).map(GroupUniqArray::Plain)
                }
                PhysicalType::List => GroupUniqArrayGeneric::<Serialized>::try_new(arg, max_size)
                    .map(GroupUniqArray::Serialized),
            }
        };
    }

    for_all_fixed_width_types!(create)
}
