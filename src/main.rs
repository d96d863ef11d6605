//! Stemdeck CLI
//!
//! Command-line interface for the stemdeck separation and mix core.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stemdeck::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Stemdeck v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.config.as_deref();
    match cli.command {
        Some(Commands::Separate {
            input,
            model,
            stems,
            json,
        }) => commands::separate(config, &input, &model, stems, json)
            .await
            .with_context(|| format!("separation of '{}' failed", input))?,
        Some(Commands::CheckConfig) => {
            commands::check_config(config).context("backend configuration is not usable")?
        }
        Some(Commands::MixPreview {
            stems,
            mute,
            solo,
            volume,
            play,
        }) => commands::mix_preview(stems, mute, solo, volume, play).await?,
        None => {
            println!("Stemdeck v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
