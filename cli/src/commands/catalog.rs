use crate::config::Settings;
use crate::console::{catalog_summary_lines, ConsoleObserver};
use anyhow::{anyhow, Result};
use clap::Args;
use snapcat_backends::{LocalFileSystem, TarArchiveReader};
use snapcat_core::{
    catalog, ArchiveExtensions, CatalogOptions, DigestAlgorithm, FileNode, StreamingDigestEngine,
};
use std::path::PathBuf;

#[derive(Args)]
pub struct CatalogCommand {
    #[arg(help = "Directory to catalog")]
    path: PathBuf,

    #[arg(long, help = "Hash algorithm (SHA-1, SHA-256, SHA-384, SHA-512, BLAKE3)")]
    hash: Option<String>,

    #[arg(long, help = "Skip hashing")]
    no_hash: bool,

    #[arg(long, help = "File name pattern (glob)")]
    pattern: Option<String>,

    #[arg(long, help = "Do not list archive contents")]
    no_archives: bool,

    #[arg(long, help = "Print the tree as JSON")]
    json: bool,
}

impl CatalogCommand {
    pub async fn run(&self, cli: &crate::Cli, settings: &Settings) -> Result<()> {
        if !self.path.is_dir() {
            return Err(anyhow!("Path does not exist: {}", self.path.display()));
        }

        let algorithm = match &self.hash {
            Some(name) => DigestAlgorithm::from_name(name)?,
            None => settings.catalog_algorithm()?,
        };
        let options = CatalogOptions {
            algorithm,
            compute_digests: !self.no_hash,
            search_pattern: self
                .pattern
                .clone()
                .unwrap_or_else(|| settings.search_pattern.clone()),
            archive_extensions: if self.no_archives {
                ArchiveExtensions::none()
            } else {
                settings.archive_extensions()
            },
            expand_archives: !self.no_archives,
        };

        let path = self.path.clone();
        let quiet = cli.quiet || self.json;
        let (tree, summary) = tokio::task::spawn_blocking(move || {
            let observer = ConsoleObserver::spinner(quiet);
            catalog(
                &LocalFileSystem,
                &path,
                &options,
                &StreamingDigestEngine,
                &TarArchiveReader,
                &observer,
            )
        })
        .await??;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&tree)?);
        } else {
            print_tree(&tree, algorithm);
            for line in catalog_summary_lines(&summary) {
                println!("{}", line);
            }
        }

        if summary.errors > 0 {
            return Err(anyhow!("Catalog completed with {} errors", summary.errors));
        }
        Ok(())
    }
}

fn print_tree(tree: &FileNode, algorithm: DigestAlgorithm) {
    for node in tree.descendants().filter(|node| !node.relative_path.is_empty()) {
        if node.is_directory() {
            println!("{:<width$} {:>12} {}/", "", "", node.relative_path, width = algorithm.digest_len() * 2);
            continue;
        }
        let digest = node
            .digest(algorithm)
            .map(|digest| digest.to_hex())
            .unwrap_or_else(|| "-".repeat(algorithm.digest_len() * 2));
        let size = node.size.map(|size| size.to_string()).unwrap_or_default();
        println!("{} {:>12} {}", digest, size, node.relative_path);
    }
}
