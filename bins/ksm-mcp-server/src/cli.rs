//! CLI surface: `init`, `profiles`, `serve`, `test`. Exit code 0 on
//! success, 1 on error — enforced by `main` mapping any `Err` to a
//! non-zero exit.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ksm-mcp-server", version, about = "Security-mediating gateway between an AI agent and Keeper Secrets Manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a profile from a one-time token or a config bundle.
    Init {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        config: Option<String>,
    },
    /// Inspect or manage stored profiles.
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },
    /// Run the JSON-RPC gateway over stdio.
    Serve {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        batch: bool,
        #[arg(long = "auto-approve")]
        auto_approve: bool,
        #[arg(long = "config-base64")]
        config_base64: Option<String>,
        #[arg(long = "no-logs")]
        no_logs: bool,
    },
    /// Verify vault connectivity for the default (or given) profile.
    Test {
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProfilesAction {
    List,
    Show { name: String },
    Delete { name: String },
    SetDefault { name: String },
}
