//! SQLite-backed implementation of the durable state store.

mod state_store;

pub use state_store::*;
