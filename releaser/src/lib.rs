//! Release pipeline executor.
//!
//! A release runs the ordered steps of a release channel against a group and
//! its entities. Steps render templates into files or run rendered shell
//! commands, optionally once per entity. Every step outcome is recorded as a
//! structured result and the first failing step aborts the run.
//!
//! - **[`core`]**: Pure, deterministic logic (config normalization, path
//!   cleaning, fan-out tallies, shared types and errors).
//! - **[`template`]**: The minijinja environment and its function library.
//! - **[`io`]**: Side-effecting operations (record store, filesystem, process
//!   execution). Isolated behind traits to enable fakes in tests.
//! - **[`actions`]**: The `template` and `shell` step types.
//!
//! [`pipeline`] sequences steps; [`release`] wires the store, the pipeline and
//! persistence together for the CLI.

pub mod actions;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod release;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
