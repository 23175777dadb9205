//! Snapshot synchronization models and engine.

mod sync_engine;
mod sync_model;
mod sync_scheduler;

pub use sync_engine::*;
pub use sync_model::*;
pub use sync_scheduler::*;

#[cfg(test)]
mod tests;
