//! CLI command implementations.

pub mod config;
pub mod explain;
pub mod simulate;

use clap::{Args, Subcommand};

/// Arguments for the explain command.
#[derive(Args)]
pub struct ExplainArgs {
    /// Absolute request URL.
    pub url: String,

    /// Request method.
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// User-Agent header.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Accept header.
    #[arg(long)]
    pub accept: Option<String>,

    /// Country supplied by the edge platform.
    #[arg(long)]
    pub country: Option<String>,

    /// Origin response status.
    #[arg(short, long, default_value = "200")]
    pub status: u16,

    /// Origin response Content-Type.
    #[arg(long, default_value = "text/html; charset=utf-8")]
    pub content_type: String,
}

/// Arguments for the simulate command.
#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (JSON) with origin routes and requests.
    pub scenario: String,

    /// Print the worker's summary log lines.
    #[arg(long)]
    pub logs: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
