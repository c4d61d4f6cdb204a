//! I/O adapters used by the workflow.

pub mod builder;
pub mod completer;
pub mod config;
pub mod describe;
pub mod file_store;
pub mod process;
pub mod prompt;
