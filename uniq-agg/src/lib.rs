#![warn(clippy::todo)]
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rustdoc::private_intra_doc_links,
    rust_2018_idioms,
    missing_docs,
    clippy::needless_borrow,
    clippy::redundant_clone,
    missing_debug_implementations
)]

//! # UniqAgg
//!
//! `UniqAgg` implements the `groupUniqArray` aggregation: collect the distinct values of
//! each group into a list.
//!
//! - Fixed width numbers are stored in the hash set directly
//! - Other values are stored in a per-partition arena as bytes, either the raw bytes of
//!   the value or its serialized form
//!
//! States can be merged, serialized for spilling or shuffling and finalized into a
//! [`ListArray`].
//!
//! [`ListArray`]: data_block::array::ListArray

pub mod aggregate;
pub mod common;
mod macros;
