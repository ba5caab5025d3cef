//! winfo: window-metrics monitor binary.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use winfo_runtime::AgentConfig;
use winfo_runtime::simulate::{self, Simulation};

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("WINFO_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Simulate(opts) => {
            let mut config = match &opts.config {
                Some(path) => AgentConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => AgentConfig::default(),
            };
            if let Some(ms) = opts.poll_interval_ms {
                config.poll_interval_ms = ms;
            }
            config.validate()?;
            if opts.windows == 0 || opts.agents_per_window == 0 {
                anyhow::bail!("--windows and --agents-per-window must be at least 1");
            }

            tracing::info!(channel = %config.channel, "winfo simulation starting");
            let sim = Simulation {
                windows: opts.windows,
                agents_per_window: opts.agents_per_window,
                duration: Duration::from_millis(opts.duration_ms),
            };
            let report = simulate::run(&sim, &config).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        cli::Command::CheckConfig { path } => {
            let config = AgentConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
