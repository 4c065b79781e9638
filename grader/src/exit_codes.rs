//! Stable exit codes for grader CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Bad config, unreadable input, or a failed extraction.
pub const INVALID: i32 = 1;
/// Nothing was discovered or selected where something was required.
pub const EMPTY: i32 = 2;
