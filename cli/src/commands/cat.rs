use crate::config::Settings;
use anyhow::Result;
use clap::Args;
use snapcat_backends::LocalFileSystem;
use snapcat_core::BackupRoot;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Args)]
pub struct CatCommand {
    #[arg(help = "Hex digest of the stored file")]
    digest: String,
}

impl CatCommand {
    pub async fn run(&self, cli: &crate::Cli, settings: &Settings) -> Result<()> {
        let root = settings.backup_root(cli.root.as_deref())?;
        let digest = self.digest.trim().to_ascii_lowercase();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let backup_root = BackupRoot::new(Arc::new(LocalFileSystem), root);
            let mut blob = backup_root.storage().open_for_read(&digest)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut blob, &mut stdout)?;
            stdout.flush()?;
            Ok(())
        })
        .await?
    }
}
