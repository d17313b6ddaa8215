mod commands;
mod config;
mod console;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use commands::{
    backup::BackupCommand, cat::CatCommand, catalog::CatalogCommand, pull::PullCommand,
    snapshots::SnapshotsCommand,
};
use config::Settings;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "snapcat",
    about = "Catalog directory trees and keep deduplicated snapshots",
    long_about = "Snapcat catalogs directory trees with their digests and archive contents, and keeps \
                  incremental, content-addressed snapshots of them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "SNAPCAT_ROOT", help = "Backup root (default: current directory)")]
    root: Option<PathBuf>,

    #[arg(long, global = true, env = "SNAPCAT_CONFIG", help = "Config file")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Catalog a directory tree")]
    Catalog(CatalogCommand),

    #[command(about = "Create a new backup")]
    Backup(BackupCommand),

    #[command(about = "List snapshots")]
    Snapshots(SnapshotsCommand),

    #[command(about = "Copy a snapshot from another backup root")]
    Pull(PullCommand),

    #[command(about = "Write a stored file to stdout")]
    Cat(CatCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet)?;

    let settings = Settings::load(cli.config.as_deref())?;
    debug!("Settings: {:?}", settings);

    match &cli.command {
        Commands::Catalog(cmd) => cmd.run(&cli, &settings).await,
        Commands::Backup(cmd) => cmd.run(&cli, &settings).await,
        Commands::Snapshots(cmd) => cmd.run(&cli, &settings).await,
        Commands::Pull(cmd) => cmd.run(&cli, &settings).await,
        Commands::Cat(cmd) => cmd.run(&cli, &settings).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "snapcat={level},snapcat_core={level},snapcat_backends={level}"
        )))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Setting default subscriber failed: {}", e))
}
