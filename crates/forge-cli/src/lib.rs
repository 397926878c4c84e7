//! Forge CLI library.
//!
//! Argument parsing, configuration file handling, command execution and
//! output formatting for the `forge` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Command};
pub use config::ForgeConfig;
pub use error::{CliError, Result};
pub use output::Formatter;
