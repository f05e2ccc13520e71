//! Macros used in the uniq-agg

/// Call macro for all of the fixed width types that `groupUniqArray` supports
///
/// Tuple: {variant name, element type}. Variant name is same with the [`PhysicalType`]
///
/// [`PhysicalType`]: data_block::types::PhysicalType
macro_rules! for_all_fixed_width_types {
    ($macro:ident) => {
        $macro! {
            {Int8, i8},
            {UInt8, u8},
            {Int16, i16},
            {UInt16, u16},
            {Int32, i32},
            {UInt32, u32},
            {Int64, i64},
            {UInt64, u64},
            {Int128, i128},
            {Float32, f32},
            {Float64, f64}
        }
    };
}

pub(crate) use for_all_fixed_width_types;
