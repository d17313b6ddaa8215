use chrono::{DateTime, Utc};
use snapcat_core::fs::{FileSystem, FsEntry, NamePattern};
use snapcat_core::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Totals from a recursive scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanTotals {
    pub files: u64,
    pub bytes: u64,
}

/// [`FileSystem`] over the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Counts the files under `path` whose names match `pattern`.
    /// Unreadable entries are skipped.
    pub fn scan(&self, path: &Path, pattern: &str) -> Result<ScanTotals> {
        let pattern = NamePattern::new(pattern)?;
        let mut totals = ScanTotals::default();

        for entry in WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if !pattern.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            totals.files += 1;
            totals.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }

        debug!("Scanned {}: {} files, {} bytes", path.display(), totals.files, totals.bytes);
        Ok(totals)
    }

    fn entry(path: &Path, metadata: &fs::Metadata) -> FsEntry {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let is_directory = metadata.is_dir();

        FsEntry {
            name,
            path: path.to_path_buf(),
            is_directory,
            size: (!is_directory).then(|| metadata.len()),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn current_directory(&self) -> Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn enumerate_entries(&self, path: &Path, pattern: &str) -> Result<Vec<FsEntry>> {
        let pattern = NamePattern::new(pattern)?;
        let mut entries = Vec::new();

        for dir_entry in fs::read_dir(path)? {
            let dir_entry = match dir_entry {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    debug!("Skipping entry in {}: {}", path.display(), e);
                    continue;
                }
            };
            let child = dir_entry.path();
            // Symlinks are followed; broken ones are skipped.
            let metadata = match fs::metadata(&child) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {}", child.display(), e);
                    continue;
                }
            };
            let entry = Self::entry(&child, &metadata);
            if entry.is_directory || pattern.matches(&entry.name) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> Result<FsEntry> {
        let metadata = fs::metadata(path)?;
        Ok(Self::entry(path, &metadata))
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn Read>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create_for_write(&self, path: &Path) -> Result<Box<dyn Write>> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(Error::from)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}
