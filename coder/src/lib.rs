//! LLM-driven refactoring of a single source file.
//!
//! One run asks a completion endpoint for a refactor plan, asks it again for
//! the full replacement file, writes that file, builds the project, and on a
//! failed build sends the diagnostics back for a bounded number of fixes.
//!
//! - **[`core`]**: pure logic (build results, phases, prompt budgeting).
//! - **[`io`]**: side effects (filesystem, child processes, HTTP), each
//!   behind a small API so tests can substitute scripted doubles.
//!
//! [`workflow`] ties the two together; the `coder` binary wraps it in a CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
