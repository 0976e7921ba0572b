//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};
use taskwatch::build_info::CLI_VERSION;
use taskwatch::config::BackendProtocol;

/// Follow a backend task's live event stream from the terminal.
#[derive(Debug, Parser)]
#[command(name = "taskwatch", version = CLI_VERSION)]
pub struct Args {
    /// Path to config file (default: ./taskwatch.toml or ~/.config/taskwatch/taskwatch.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Override backend host.
    #[arg(long = "host", global = true)]
    pub host: Option<String>,

    /// Override backend port.
    #[arg(long = "port", global = true)]
    pub port: Option<u16>,

    /// Override backend protocol (`http` or `https`).
    #[arg(long = "protocol", global = true, value_parser = parse_protocol)]
    pub protocol: Option<BackendProtocol>,

    /// Debug-level diagnostics on stderr.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to a task and print its events until it finishes.
    Watch {
        /// Task to follow.
        task_id: String,

        /// Access token to use instead of the environment or stored login.
        #[arg(long = "token")]
        token: Option<String>,

        /// Print one JSON object per event instead of text.
        #[arg(long = "json")]
        json: bool,

        /// Disable color output.
        #[arg(long = "no-color")]
        no_color: bool,
    },
    /// Store credentials for the configured backend.
    Login {
        /// Access token (prompted for when omitted).
        #[arg(long = "token")]
        token: Option<String>,

        /// Refresh token used to renew the access token.
        #[arg(long = "refresh-token")]
        refresh_token: Option<String>,

        /// Access-token lifetime in seconds.
        #[arg(long = "expires-in", value_name = "SECS")]
        expires_in: Option<i64>,
    },
    /// Remove stored credentials for the configured backend.
    Logout,
    /// Show stored credential health for the configured backend.
    Token,
    /// Write the default config to ~/.config/taskwatch/taskwatch.toml.
    Init {
        /// Replace an existing config (a timestamped backup is kept).
        #[arg(long = "force")]
        force: bool,
    },
}

fn parse_protocol(value: &str) -> Result<BackendProtocol, String> {
    BackendProtocol::parse(value).ok_or_else(|| format!("expected `http` or `https`, got `{value}`"))
}
