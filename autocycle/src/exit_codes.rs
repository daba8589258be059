//! Stable exit codes for `autocycle` commands.

/// Command succeeded, or the session finished its queue.
pub const OK: i32 = 0;
/// Invalid config, arguments or any other error.
pub const INVALID: i32 = 1;
/// Session stopped short of its queue (supply exhausted, tick limit).
pub const STOPPED: i32 = 2;
/// Session was halted by a safety check (emergency stop or failure ceiling).
pub const HALTED: i32 = 3;
