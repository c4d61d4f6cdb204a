//! Stable exit codes for coder CLI commands.

/// Command succeeded; for `build`/`run`, the final build passed or was skipped.
pub const OK: i32 = 0;
/// Command failed due to invalid config or a runtime error (I/O, spawn, LLM).
pub const INVALID: i32 = 1;
/// `coder build` or the verification build of `coder run` failed.
pub const BUILD_FAILED: i32 = 2;
