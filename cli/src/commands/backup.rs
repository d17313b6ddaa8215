use crate::config::Settings;
use crate::console::{backup_summary_lines, ConsoleObserver};
use anyhow::{anyhow, Result};
use clap::Args;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use snapcat_backends::LocalFileSystem;
use snapcat_core::{BackupOptions, BackupRoot, StreamingDigestEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct BackupCommand {
    #[arg(help = "Directory to back up")]
    path: PathBuf,

    #[arg(short, long, help = "Snapshot name")]
    name: String,

    #[arg(long, help = "File name pattern (glob)")]
    pattern: Option<String>,
}

impl BackupCommand {
    pub async fn run(&self, cli: &crate::Cli, settings: &Settings) -> Result<()> {
        if !self.path.is_dir() {
            return Err(anyhow!("Path does not exist: {}", self.path.display()));
        }

        let root = settings.backup_root(cli.root.as_deref())?;
        let options = BackupOptions {
            snapshot_name: self.name.clone(),
            search_pattern: self
                .pattern
                .clone()
                .unwrap_or_else(|| settings.search_pattern.clone()),
            algorithm: settings.backup_algorithm()?,
            started_at: None,
        };

        info!("Backing up {} into {}", self.path.display(), root.display());

        let pb = if cli.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.set_message("Scanning files...");
        let totals = LocalFileSystem.scan(&self.path, &options.search_pattern)?;
        pb.finish_with_message(format!(
            "Found {} files ({})",
            totals.files,
            HumanBytes(totals.bytes)
        ));

        let source = self.path.clone();
        let quiet = cli.quiet;
        let summary = tokio::task::spawn_blocking(move || {
            let backup_root = BackupRoot::new(Arc::new(LocalFileSystem), root);
            let observer = ConsoleObserver::with_total(totals.files, quiet);
            backup_root.run_backup(&source, &options, &StreamingDigestEngine, &observer)
        })
        .await??;

        for line in backup_summary_lines(&summary) {
            println!("{}", line);
        }

        if summary.has_skipped() {
            return Err(anyhow!(
                "Backup completed, but {} files were skipped",
                summary.skipped
            ));
        }
        Ok(())
    }
}
