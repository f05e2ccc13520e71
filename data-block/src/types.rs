//! Physical and logical types of the arrays

use std::fmt::Display;
use std::num::NonZeroU8;
use std::sync::Arc;

pub use crate::array::Array;
pub use crate::array::primitive::PrimitiveType;

/// Physical type has a one-to-one mapping to each struct that implements [`Array`]
///
/// [`PhysicalType`] determines the memory representation of the [`Array`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    /// `i8`
    Int8,
    /// `u8`
    UInt8,
    /// `i16`
    Int16,
    /// `u16`
    UInt16,
    /// `i32`
    Int32,
    /// `u32`
    UInt32,
    /// `i64`
    Int64,
    /// `u64`
    UInt64,
    /// `i128`
    Int128,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
    /// Variable length bytes. Utf-8 string is a logical property, `VARCHAR` and
    /// `VARBINARY` share this physical type
    Binary,
    // Complex types
    /// Offsets plus a child array of any physical type
    List = 64,
}

impl Display for PhysicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhysicalType::{:?}", self)
    }
}

impl PhysicalType {
    /// Returns true if the value of this type occupies a continuous memory region in its
    /// array and the raw bytes of the region can represent the value unambiguously.
    /// Values of these types can be copied as raw bytes, without serialization
    #[inline]
    pub fn is_value_contiguous(&self) -> bool {
        !matches!(self, Self::List)
    }
}

/// Type of the values as the user sees them. Several logical types can share one
/// [`PhysicalType`], the aggregation functions are chosen by the physical type of
/// their argument and the output [`Array`] carries the logical type of the argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// `TINYINT`
    TinyInt,
    /// `SMALLINT`
    SmallInt,
    /// `INTEGER`
    Integer,
    /// `BIGINT`
    BigInt,
    /// `HUGEINT`
    HugeInt,
    /// `UTINYINT`
    UnsignedTinyInt,
    /// `USMALLINT`
    UnsignedSmallInt,
    /// `UINTEGER`
    UnsignedInteger,
    /// `UBIGINT`
    UnsignedBigInt,
    /// `REAL`
    Float,
    /// `DOUBLE`
    Double,
    /// `DECIMAL(precision, scale)`, stores the unscaled value in `i64` when the precision
    /// is at most 18, `i128` otherwise
    Decimal {
        /// 1 <= precision <= 38
        precision: NonZeroU8,
        /// 0 <= scale <= 38
        scale: u8,
    },
    /// Days since the unix epoch
    Date,
    /// Timestamp in microseconds, stored with i64
    Timestamp,
    /// Utf-8 string
    VarChar,
    /// Arbitrary bytes
    VarBinary,

    // Complex types
    /// List whose elements have `element_type`, lists can be nested
    List {
        /// Logical type of the elements, shared by the clones of the list type
        element_type: Arc<LogicalType>,
        /// Elements may be `NULL`
        is_nullable: bool,
    },
}

impl LogicalType {
    /// Physical type that stores the values of this logical type
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            Self::TinyInt => PhysicalType::Int8,
            Self::SmallInt => PhysicalType::Int16,
            Self::Integer => PhysicalType::Int32,
            Self::BigInt => PhysicalType::Int64,
            Self::HugeInt => PhysicalType::Int128,
            Self::UnsignedTinyInt => PhysicalType::UInt8,
            Self::UnsignedSmallInt => PhysicalType::UInt16,
            Self::UnsignedInteger => PhysicalType::UInt32,
            Self::UnsignedBigInt => PhysicalType::UInt64,
            Self::Float => PhysicalType::Float32,
            Self::Double => PhysicalType::Float64,
            Self::Decimal { precision, .. } => {
                if precision.get() <= 18 {
                    PhysicalType::Int64
                } else {
                    PhysicalType::Int128
                }
            }
            Self::Date => PhysicalType::Int32,
            Self::Timestamp => PhysicalType::Int64,
            Self::VarChar | Self::VarBinary => PhysicalType::Binary,

            // Complex types
            Self::List { .. } => PhysicalType::List,
        }
    }

    /// Create a nullable list type whose element has `element_type`
    #[inline]
    pub fn list(element_type: LogicalType) -> Self {
        Self::List {
            element_type: Arc::new(element_type),
            is_nullable: true,
        }
    }

    /// Get the element type if self is `List`
    #[inline]
    pub fn element_type(&self) -> Option<&LogicalType> {
        match self {
            Self::List { element_type, .. } => Some(element_type),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_type() {
        let decimal = LogicalType::Decimal {
            precision: NonZeroU8::new(20).unwrap(),
            scale: 2,
        };
        assert_eq!(decimal.physical_type(), PhysicalType::Int128);
        assert_eq!(LogicalType::VarChar.physical_type(), PhysicalType::Binary);
        assert_eq!(
            LogicalType::list(LogicalType::Integer).physical_type(),
            PhysicalType::List
        );
        assert!(PhysicalType::Binary.is_value_contiguous());
        assert!(!PhysicalType::List.is_value_contiguous());
    }
}
