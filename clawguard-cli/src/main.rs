//! The `clawguard` binary.
//!
//! A security gateway for untrusted automated agents: upstream
//! credentials stay here, every outbound call is policy-checked, and
//! sensitive calls wait for a human decision over Telegram.

mod config_file;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clawguard", version, about = "Credential-holding approval gateway for untrusted agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway.
    Run {
        /// Path to the YAML configuration file.
        #[arg(short, long, default_value = "clawguard.yaml")]
        config: PathBuf,
    },

    /// Parse and validate the configuration, then exit.
    CheckConfig {
        /// Path to the YAML configuration file.
        #[arg(short, long, default_value = "clawguard.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run::run(&config).await,
        Command::CheckConfig { config } => {
            let loaded = config_file::load(&config)?;
            println!(
                "{}: ok ({} services)",
                config.display(),
                loaded.services.len()
            );
            Ok(())
        }
    }
}
