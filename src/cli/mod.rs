//! CLI Module
//!
//! Developer command-line interface for exercising the separation backend and
//! the mix engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stemdeck - stem separation jobs and multi-track mix preview
#[derive(Parser, Debug)]
#[command(name = "stemdeck-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON backend configuration (STEMDECK_* variables still override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Separate an audio file or hosted URL into stems
    #[command(name = "separate")]
    Separate {
        /// Local audio file, or an http(s) URL the service can fetch
        input: String,

        /// Separation model (defaults to the configured model)
        #[arg(short, long, default_value = "")]
        model: String,

        /// Comma-separated stems to keep, e.g. vocals,drums
        #[arg(short, long, value_delimiter = ',')]
        stems: Vec<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and print the effective backend configuration
    #[command(name = "check-config")]
    CheckConfig,

    /// Resolve a mix and preview its gains on the simulated clock
    #[command(name = "mix-preview")]
    MixPreview {
        /// Comma-separated stem ids
        #[arg(short, long, value_delimiter = ',', default_value = "vocals,drums,bass,other")]
        stems: Vec<String>,

        /// Stems to mute
        #[arg(long, value_delimiter = ',')]
        mute: Vec<String>,

        /// Stems to solo
        #[arg(long, value_delimiter = ',')]
        solo: Vec<String>,

        /// Volume overrides as id=volume
        #[arg(long, value_delimiter = ',')]
        volume: Vec<String>,

        /// Run the transport for this many seconds
        #[arg(long, default_value_t = 0.0)]
        play: f64,
    },
}
