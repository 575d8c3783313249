//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tkube_core::paths::HOME_ENV;

/// Success exit code
pub const EXIT_OK: i32 = 0;
/// Operation failure exit code
pub const EXIT_FAILURE: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;

/// Parsed command line.
#[derive(Parser, Debug)]
#[command(name = "tkube")]
#[command(about = "Run the Teleport client each environment needs, with isolated sessions")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Data root override.
    #[arg(
        long,
        global = true,
        env = HOME_ENV,
        value_name = "DIR",
        help = "Data directory (defaults to ~/.tkube)"
    )]
    pub home: Option<PathBuf>,

    /// Debug logging for the tkube crates.
    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    /// JSON log lines on stderr.
    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub log_json: bool,
}

/// tkube subcommands.
#[allow(missing_docs)]
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Detect the client version a proxy requires")]
    Detect {
        #[arg(help = "Proxy address, e.g. teleport.example.com:443")]
        proxy: String,
    },
    #[command(about = "Install a client version")]
    Install { version: String },
    #[command(about = "Remove an installed client version")]
    Uninstall { version: String },
    #[command(about = "List installed client versions")]
    Versions,
    #[command(about = "Show session status of one or all environments")]
    Status { env: Option<String> },
    #[command(about = "Log in to an environment")]
    Login { env: String },
    #[command(about = "Log out of an environment")]
    Logout { env: String },
    #[command(about = "List Kubernetes clusters of an environment")]
    Clusters { env: String },
    #[command(about = "Log in to a Kubernetes cluster, logging in to the environment if needed")]
    Connect { env: String, cluster: String },
    #[command(about = "Detect and pin versions for all environments without one")]
    AutoDetect,
}

/// Parse the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
