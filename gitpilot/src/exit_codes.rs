//! Stable exit codes for gitpilot CLI commands.

/// Command succeeded (every executed step succeeded).
pub const OK: i32 = 0;
/// Invalid invocation, configuration, or repository state.
pub const INVALID: i32 = 1;
/// The run finished with at least one failed or blocked step.
pub const FAILED: i32 = 2;
/// The user declined the proposed plan before anything ran.
pub const DECLINED: i32 = 3;
/// The plan or commit-message provider failed (timeout, crash, malformed output).
pub const PROVIDER: i32 = 4;
