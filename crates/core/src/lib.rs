//! Core domain logic for drain maintenance tracking: schedule arithmetic,
//! the drain registry, cross-device snapshot sync, and alert gating.

pub mod drains;
pub mod errors;
pub mod events;
pub mod export;
pub mod notifications;
pub mod schedule;
pub mod store;
pub mod sync;
