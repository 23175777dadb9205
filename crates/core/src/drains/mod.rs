//! Drain entities and the registry that owns them.

mod drain_model;
mod registry;

pub use drain_model::*;
pub use registry::*;
