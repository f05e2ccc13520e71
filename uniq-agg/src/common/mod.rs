//! Common components shared by the aggregation states

pub mod arena;
pub mod hash_set;
pub mod io;
