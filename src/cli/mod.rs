//! CLI module for myrest
//!
//! Provides command-line interface for:
//! - serve: boot and serve the data API
//! - introspect: one-shot schema introspection

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{apply_overrides, introspect, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};

/// Parse the command line and run it
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}
