//! I/O helpers for release commands.

pub mod config;
pub mod fs;
pub mod process;
pub mod shell;
pub mod store;
