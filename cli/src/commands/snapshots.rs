use crate::config::Settings;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snapcat_backends::LocalFileSystem;
use snapcat_core::{BackupRoot, Snapshot, TracingObserver};
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct SnapshotsCommand {
    #[arg(help = "Snapshot name; lists its generations")]
    name: Option<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(Serialize)]
struct NameRow {
    name: String,
    generations: usize,
    latest: Option<String>,
}

#[derive(Serialize)]
struct GenerationRow {
    #[serde(flatten)]
    snapshot: Snapshot,
    files: usize,
}

impl SnapshotsCommand {
    pub async fn run(&self, cli: &crate::Cli, settings: &Settings) -> Result<()> {
        let root = settings.backup_root(cli.root.as_deref())?;
        info!("Listing snapshots in {}", root.display());
        let backup_root = BackupRoot::new(Arc::new(LocalFileSystem), root);
        let store = backup_root.snapshots();

        match &self.name {
            None => {
                let mut rows = Vec::new();
                for name in store.names()? {
                    let generations = store.generations(&name)?;
                    rows.push(NameRow {
                        latest: generations.last().map(|s| s.generation.clone()),
                        generations: generations.len(),
                        name,
                    });
                }

                if self.json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else if rows.is_empty() {
                    println!("No snapshots found");
                } else {
                    println!("{:<24} {:<12} {}", "Name", "Generations", "Latest");
                    println!("{:-<60}", "");
                    for row in rows {
                        println!(
                            "{:<24} {:<12} {}",
                            row.name,
                            row.generations,
                            row.latest.unwrap_or_default()
                        );
                    }
                }
            }
            Some(name) => {
                let mut rows = Vec::new();
                for snapshot in store.generations(name)? {
                    let files = store.read_snapshot(&snapshot)?.records(&TracingObserver).count();
                    rows.push(GenerationRow { snapshot, files });
                }

                if self.json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else if rows.is_empty() {
                    println!("No snapshots found for {}", name);
                } else {
                    println!("{:<20} {:<20} {:<8} {}", "Generation", "Date", "Files", "Path");
                    println!("{:-<100}", "");
                    for row in rows {
                        let date = row
                            .snapshot
                            .time()
                            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default();
                        println!(
                            "{:<20} {:<20} {:<8} {}",
                            row.snapshot.generation,
                            date,
                            row.files,
                            row.snapshot.path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
