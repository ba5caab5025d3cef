//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "winfo", about = "peer-to-peer window metrics monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run agents on simulated windows over an in-memory network and print
    /// what each window sees (JSON)
    Simulate(SimulateOpts),
    /// Load and validate a config file
    CheckConfig {
        /// Path to a TOML config file
        path: PathBuf,
    },
}

#[derive(clap::Args)]
pub struct SimulateOpts {
    /// Number of simulated windows
    #[arg(long, default_value = "3")]
    pub windows: usize,

    /// Co-located agents per window
    #[arg(long, default_value = "2")]
    pub agents_per_window: usize,

    /// How long to drive the scripted activity, in milliseconds
    #[arg(long, default_value = "2000")]
    pub duration_ms: u64,

    /// TOML config file (defaults apply when omitted)
    #[arg(long, env = "WINFO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the position polling interval
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}
