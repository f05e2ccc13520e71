//! # DataBlock
//!
//! `DataBlock` is a small columnar memory format inspired by [`Arrow`]. This crate uses
//! the implementation described in [`Type Exercise in Rust`] to support the arrays
//! that the aggregation functions consume and produce.
//!
//! Buffers of the arrays are shared with [`cow::CowPtr`]: an array can reference the
//! buffers of another array without copy, and the buffer is copied only when a shared
//! array is written.
//!
//! [`Arrow`]: https://github.com/apache/arrow-rs
//! [`Type Exercise in Rust`]: https://github.com/skyzh/type-exercise-in-rust

pub mod array;
pub mod cow;
mod macros;
pub mod types;
pub mod utils;

mod private {
    /// Sealed trait protect against downstream implementations
    pub trait Sealed {}
}
