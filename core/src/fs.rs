//! Filesystem seam.
//!
//! The core never touches the disk directly; every open, enumerate and
//! rename goes through [`FileSystem`] so tests can substitute
//! [`crate::memory::MemoryFileSystem`].

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Metadata for one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

pub trait FileSystem: Send + Sync {
    fn current_directory(&self) -> Result<PathBuf>;

    fn directory_exists(&self, path: &Path) -> bool;

    fn file_exists(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents. Succeeds if it already exists.
    fn create_directory(&self, path: &Path) -> Result<()>;

    /// Lists the immediate children of `path`. Files are filtered by the glob
    /// `pattern`; directories are always returned.
    fn enumerate_entries(&self, path: &Path, pattern: &str) -> Result<Vec<FsEntry>>;

    fn stat(&self, path: &Path) -> Result<FsEntry>;

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn Read>>;

    /// Creates a new file for writing. Fails if `path` already exists.
    fn create_for_write(&self, path: &Path) -> Result<Box<dyn Write>>;

    /// Moves a file into place, replacing any file already at `to`.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Joins a slash-separated relative path onto `base`.
    fn combine_path(&self, base: &Path, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(base.to_path_buf(), |path, segment| path.join(segment))
    }
}

/// Compiled glob used to filter file names during enumeration.
#[derive(Debug, Clone)]
pub struct NamePattern {
    pattern: Option<glob::Pattern>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "*" {
            return Ok(Self { pattern: None });
        }
        let compiled = glob::Pattern::new(pattern)
            .map_err(|e| Error::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self {
            pattern: Some(compiled),
        })
    }

    pub fn any() -> Self {
        Self { pattern: None }
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => pattern.matches(name),
        }
    }
}
