//! C10 (local) and C11 (global map/reduce) retrievers.

pub mod global;
pub mod local;
