//! Timing constants for the sync engine.

/// Quiet window after the last mutation before a push fires.
pub const PUSH_DEBOUNCE_MS: u64 = 1_000;

/// Interval between periodic pulls while a sync code is active.
pub const PULL_INTERVAL_SECS: u64 = 20;
