//! CLI argument definitions using clap
//!
//! Commands:
//! - myrest serve [--host H] [--port P] [--permissions FILE]
//! - myrest introspect [--permissions FILE]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// myrest - a REST API over a MySQL database
#[derive(Parser, Debug)]
#[command(name = "myrest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Serve the data API until Ctrl-C
    Serve {
        /// Listen host (overrides MYREST_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides MYREST_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Permissions file (overrides MYREST_PERMISSIONS_FILE)
        #[arg(long)]
        permissions: Option<PathBuf>,
    },

    /// Introspect the database once and print the schema description
    Introspect {
        /// Permissions file (overrides MYREST_PERMISSIONS_FILE)
        #[arg(long)]
        permissions: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
