//! Command implementations

pub mod mapping;
pub mod sync;
