//! Blob store client implementing the cross-device snapshot transport.

mod client;
mod error;

pub use client::*;
pub use error::*;
