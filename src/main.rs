//! CLI entry point for the MARC export harvester.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod app;
mod app_config;
mod cli;

use app::Harvester;
use app::terminal::{init_tracing, is_no_color_requested, resolve_default_level};
use cli::{Args, RunMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = app_config::load_config(args.config.as_deref())?;
    let config_level = loaded.config.log_level();

    // Priority: RUST_LOG env var > verbosity flags > config level > default (info)
    let default_level = resolve_default_level(args.cli_log_level(), config_level.as_deref());
    init_tracing(&default_level, is_no_color_requested());

    debug!(?args, "CLI arguments parsed");
    match &loaded.path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => debug!("no config file found, using defaults"),
    }
    info!(version = env!("CARGO_PKG_VERSION"), "marc-harvester starting");

    let harvester = Harvester::from_config(&loaded.config).await?;

    let token = CancellationToken::new();
    app::spawn_shutdown_listener(token.clone());

    match args.mode() {
        RunMode::Manual => harvester.run_manual(&token).await,
        RunMode::Monitor => harvester.run_monitor(&token, false).await,
        RunMode::Force => harvester.run_monitor(&token, true).await,
    }
}
