//! blexfer CLI library
//!
//! Argument parsing, configuration loading and the handlers behind the
//! `central`, `peripheral` and `loopback` subcommands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::{run_loopback, CommandDispatcher};
pub use config::AppConfig;
pub use error::{CliError, Result};
