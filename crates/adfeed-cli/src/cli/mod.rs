//! CLI for the adfeed ad delivery client.

mod commands;

use adfeed_core::config::{self, ClientConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use commands::{run_assets, run_config, run_get_ad, run_play};

/// Top-level CLI for the adfeed client.
#[derive(Debug, Parser)]
#[command(name = "adfeed")]
#[command(about = "adfeed: request, cache and confirm digital-signage ads", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/adfeed/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Request ads from the decision service and print them.
    GetAd {
        /// JSON file holding the ad request.
        #[arg(long, value_name = "JSON")]
        request: PathBuf,
    },

    /// Request the asset list from the asset endpoint and print it.
    Assets {
        /// JSON file holding the ad request.
        #[arg(long, value_name = "JSON")]
        request: PathBuf,
    },

    /// Request ads, then confirm every returned ad as played.
    Play {
        /// JSON file holding the ad request.
        #[arg(long, value_name = "JSON")]
        request: PathBuf,
        /// Seconds each ad was on screen.
        #[arg(long, default_value = "10", value_name = "SECS")]
        display_time: i64,
    },

    /// Print the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::GetAd { request } => run_get_ad(cfg, &request).await?,
            CliCommand::Assets { request } => run_assets(cfg, &request).await?,
            CliCommand::Play {
                request,
                display_time,
            } => run_play(cfg, &request, display_time).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => config::load_from(path),
        None => config::load_or_init(),
    }
}
