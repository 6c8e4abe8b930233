//! Tooling & Integration Layer
//!
//! Command-line entry points over the build core.

pub mod cli;

pub use cli::{CacheCommands, Cli, CliContext, Commands};
