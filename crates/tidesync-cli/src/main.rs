//! Tidesync CLI
//!
//! Thin command-line surface over the sync engine:
//! - `sync` runs a single pass and prints the summary
//! - `watch` keeps syncing until interrupted
//! - `status` reports what the journal knows
//! - `pin` / `resync` per-path maintenance

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    pin::PinCommand, resync::ResyncCommand, status::StatusCommand, sync::SyncCommand,
    watch::WatchCommand,
};
use tidesync_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "tidesync", version, about = "Bidirectional file synchronization")]
pub struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one synchronization pass
    Sync(SyncCommand),
    /// Synchronize continuously until interrupted
    Watch(WatchCommand),
    /// Show journal and sync state
    Status(StatusCommand),
    /// Set the pin policy for a path
    Pin(PinCommand),
    /// Drop sync state under a path so the next pass rebuilds it
    Resync(ResyncCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let filter = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(config).await,
        Commands::Watch(cmd) => cmd.execute(config).await,
        Commands::Status(cmd) => cmd.execute(config).await,
        Commands::Pin(cmd) => cmd.execute(config).await,
        Commands::Resync(cmd) => cmd.execute(config).await,
    }
}
