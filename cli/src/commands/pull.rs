use crate::config::Settings;
use crate::console::ConsoleObserver;
use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Args;
use snapcat_backends::LocalFileSystem;
use snapcat_core::snapshot::parse_snapshot_date;
use snapcat_core::BackupRoot;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct PullCommand {
    #[arg(long, help = "Backup root to copy from")]
    from: PathBuf,

    #[arg(short, long, help = "Snapshot name")]
    name: String,

    #[arg(long, help = "Pick the latest snapshot at or before this date")]
    date: Option<String>,
}

impl PullCommand {
    pub async fn run(&self, cli: &crate::Cli, settings: &Settings) -> Result<()> {
        let destination = settings.backup_root(cli.root.as_deref())?;
        let date = self.date.as_deref().map(parse_snapshot_date).transpose()?;

        info!(
            "Pulling {} from {} into {}",
            self.name,
            self.from.display(),
            destination.display()
        );

        let source = self.from.clone();
        let name = self.name.clone();
        let quiet = cli.quiet;
        let pulled = tokio::task::spawn_blocking(move || {
            let source = BackupRoot::new(Arc::new(LocalFileSystem), source);
            let destination = BackupRoot::new(Arc::new(LocalFileSystem), destination);
            let observer = ConsoleObserver::spinner(quiet);
            destination.pull_snapshot(&source, &name, date, Utc::now(), &observer)
        })
        .await??;

        let Some(summary) = pulled else {
            println!("No snapshot {} found in {}", self.name, self.from.display());
            return Ok(());
        };

        println!("Source: {}", summary.source_snapshot.display());
        println!("Snapshot: {}", summary.snapshot_path.display());
        println!(
            "Records: {} ({} blobs copied, {} already present)",
            summary.records, summary.blobs_copied, summary.already_present
        );

        if summary.skipped > 0 {
            return Err(anyhow!("Pull completed, but {} files were skipped", summary.skipped));
        }
        Ok(())
    }
}
