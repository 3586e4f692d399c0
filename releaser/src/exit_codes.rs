//! Stable exit codes for releaser CLI commands.

/// Command succeeded; for release commands, every step succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, missing records or other errors.
pub const INVALID: i32 = 1;
/// A release ran but a step failed and the pipeline aborted.
pub const FAILED: i32 = 2;
