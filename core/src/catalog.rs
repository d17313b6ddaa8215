//! Full catalog run: read the tree, hash every file, list archive contents.
//! Nothing is written to storage.

use crate::archive::{append_entries, ArchiveExtensions, ArchiveReader};
use crate::digest::{Digest, DigestAlgorithm, DigestEngine};
use crate::events::Observer;
use crate::fs::FileSystem;
use crate::tree::{read_tree, FileNode};
use crate::walker::walk;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub algorithm: DigestAlgorithm,
    pub compute_digests: bool,
    pub search_pattern: String,
    pub archive_extensions: ArchiveExtensions,
    pub expand_archives: bool,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::CATALOG_DEFAULT,
            compute_digests: true,
            search_pattern: "*".to_string(),
            archive_extensions: ArchiveExtensions::default(),
            expand_archives: true,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub directories: usize,
    pub files: usize,
    pub archives: usize,
    pub archive_entries: usize,
    pub digests_computed: usize,
    pub total_size: u64,
    pub errors: usize,
}

/// Catalogs the tree under `root`.
///
/// Unreadable files and undecodable archives are reported through
/// `observer` and counted in [`CatalogSummary::errors`]; the run continues.
/// So are subdirectories that cannot be listed. Failing to list `root` is
/// fatal.
pub fn catalog(
    fs: &dyn FileSystem,
    root: &Path,
    options: &CatalogOptions,
    engine: &dyn DigestEngine,
    archives: &dyn ArchiveReader,
    observer: &dyn Observer,
) -> Result<(FileNode, CatalogSummary)> {
    let (mut tree, unlisted) = read_tree(fs, root, &options.search_pattern, observer)?;
    let mut summary = CatalogSummary {
        errors: unlisted,
        ..CatalogSummary::default()
    };

    walk(&mut tree, |node| {
        if node.is_directory() {
            summary.directories += 1;
            return;
        }
        if node.is_archive_entry() {
            summary.archive_entries += 1;
            observer.archive_entry_found(&node.relative_path);
            return;
        }

        summary.files += 1;
        summary.total_size += node.size.unwrap_or(0);
        let path = fs.combine_path(root, &node.relative_path);

        if options.compute_digests {
            match hash_file(fs, &path, options.algorithm, engine) {
                Ok(digest) => {
                    observer.digest_computed(&node.relative_path, &digest);
                    node.set_digest(digest);
                    summary.digests_computed += 1;
                }
                Err(e) => {
                    observer.item_failed(&node.relative_path, &e);
                    summary.errors += 1;
                }
            }
        }

        if options.expand_archives && options.archive_extensions.matches(&node.name) {
            summary.archives += 1;
            observer.archive_found(&node.relative_path);
            let listed = fs
                .open_for_read(&path)
                .and_then(|stream| archives.enumerate_entries(&node.name, stream));
            match listed {
                Ok(entries) => {
                    append_entries(node, entries);
                }
                Err(e) => {
                    observer.item_failed(&node.relative_path, &e);
                    summary.errors += 1;
                }
            }
        }
    });

    observer.catalog_finished(&summary);
    Ok((tree, summary))
}

pub(crate) fn hash_file(
    fs: &dyn FileSystem,
    path: &Path,
    algorithm: DigestAlgorithm,
    engine: &dyn DigestEngine,
) -> Result<Digest> {
    let mut stream = fs.open_for_read(path)?;
    engine.compute(algorithm, &mut *stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use crate::events::NullObserver;
    use crate::memory::MemoryFileSystem;
    use crate::digest::StreamingDigestEngine;
    use crate::Error;
    use chrono::{TimeZone, Utc};
    use std::io::Read;

    /// Treats every line of the archive body as an entry name.
    struct LineArchive;

    impl ArchiveReader for LineArchive {
        fn enumerate_entries(&self, file_name: &str, mut stream: Box<dyn Read>) -> Result<Vec<ArchiveEntry>> {
            let mut body = String::new();
            stream.read_to_string(&mut body)?;
            if body.starts_with("corrupt") {
                return Err(Error::Archive(format!("{}: bad header", file_name)));
            }
            Ok(body
                .lines()
                .map(|name| ArchiveEntry {
                    name: name.to_string(),
                    size: Some(1),
                    modified_at: None,
                })
                .collect())
        }
    }

    fn sample_fs() -> MemoryFileSystem {
        let time = Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap();
        let fs = MemoryFileSystem::default();
        fs.add_file("src/1.txt", b"Hello world", time);
        fs.add_file("src/docs/bundle.zip", b"a.txt\nb/c.txt", time);
        fs.add_file("src/docs/broken.tgz", b"corrupt", time);
        fs
    }

    #[test]
    fn test_catalog_hashes_and_expands() {
        let fs = sample_fs();
        let (tree, summary) = catalog(
            &fs,
            Path::new("/work/src"),
            &CatalogOptions::default(),
            &StreamingDigestEngine,
            &LineArchive,
            &NullObserver,
        )
        .unwrap();

        let file = tree.find("1.txt").unwrap();
        assert_eq!(
            file.digest(DigestAlgorithm::Sha1).unwrap().to_hex(),
            "7b502c3a1f48c8609ae212cdfb639dee39673f5e"
        );

        let archive = tree.find("docs/bundle.zip").unwrap();
        let entry = &archive.children[1];
        assert_eq!(entry.relative_path, "docs/bundle.zip/b/c.txt");
        assert_eq!(tree.find("docs/bundle.zip/b/c.txt"), Some(entry));
        assert_eq!(entry.name, "c.txt");
        assert!(entry.is_archive_entry());
        assert!(entry.digests.is_empty());

        assert_eq!(summary.directories, 2);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.archives, 2);
        assert_eq!(summary.archive_entries, 2);
        assert_eq!(summary.digests_computed, 3);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn test_catalog_without_archives_or_hashing() {
        let fs = sample_fs();
        let options = CatalogOptions {
            compute_digests: false,
            expand_archives: false,
            ..CatalogOptions::default()
        };
        let (tree, summary) = catalog(
            &fs,
            Path::new("/work/src"),
            &options,
            &StreamingDigestEngine,
            &LineArchive,
            &NullObserver,
        )
        .unwrap();

        assert!(tree.find("docs/bundle.zip").unwrap().children.is_empty());
        assert!(tree.descendants().all(|node| node.digests.is_empty()));
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.archives, 0);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let fs = sample_fs();
        fs.make_unreadable("/work/src/1.txt");

        let (tree, summary) = catalog(
            &fs,
            Path::new("/work/src"),
            &CatalogOptions::default(),
            &StreamingDigestEngine,
            &LineArchive,
            &NullObserver,
        )
        .unwrap();

        assert!(tree.find("1.txt").unwrap().digests.is_empty());
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.digests_computed, 2);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let fs = MemoryFileSystem::default();
        let result = catalog(
            &fs,
            Path::new("/work/missing"),
            &CatalogOptions::default(),
            &StreamingDigestEngine,
            &LineArchive,
            &NullObserver,
        );
        assert!(result.is_err());
    }
}
