//! medgate - capture pipeline harness.
//!
//! Runs the sensor-gated capture pipeline against a live camera and the
//! configured verification service. `verify` checks a capture against a
//! trained container fingerprint; `enroll` trains the fingerprint.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medgate_core::{CaptureMode, MedgateConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// medgate - medication container capture pipeline
#[derive(Parser, Debug)]
#[command(name = "medgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "medgate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify that the held container matches a trained fingerprint
    Verify {
        /// Subject (container) identifier
        #[arg(short, long)]
        subject: String,

        /// Automatic retries after a failed attempt
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Train the container fingerprint from a fresh capture
    Enroll {
        /// Subject (container) identifier
        #[arg(short, long)]
        subject: String,

        /// Automatic retries after a failed attempt
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = if cli.config.exists() {
        MedgateConfig::from_file(&cli.config)
            .with_context(|| format!("loading config from {}", cli.config.display()))?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found; using defaults");
        MedgateConfig::default()
    };

    let verified = match cli.command {
        Commands::Verify { subject, retries } => {
            commands::run_capture(&config, CaptureMode::Verify, subject, retries).await?
        }
        Commands::Enroll { subject, retries } => {
            commands::run_capture(&config, CaptureMode::Enroll, subject, retries).await?
        }
    };

    if !verified {
        std::process::exit(1);
    }
    Ok(())
}
