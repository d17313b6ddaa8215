//! Archive seam: enumerating named entries inside an archive stream.

use crate::tree::FileNode;
use crate::Result;
use chrono::{DateTime, Utc};
use std::io::Read;

/// One named entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Decodes archive streams. Implementations live outside the core.
pub trait ArchiveReader {
    /// Lists the entries of the archive in `stream`. `file_name` lets the
    /// implementation pick a decoder (compressed or not).
    fn enumerate_entries(&self, file_name: &str, stream: Box<dyn Read>) -> Result<Vec<ArchiveEntry>>;
}

/// File-name suffixes that mark a file as an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveExtensions {
    extensions: Vec<String>,
}

impl Default for ArchiveExtensions {
    fn default() -> Self {
        Self::new(["zip", "tar", "tar.gz", "tgz"])
    }
}

impl ArchiveExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn none() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.extensions.iter().any(|ext| {
            lower.len() > ext.len() + 1
                && lower.ends_with(ext.as_str())
                && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
        })
    }

    pub fn as_slice(&self) -> &[String] {
        &self.extensions
    }
}

/// Appends one synthetic child per archive entry to `node`. Entries stay
/// flat: `name` is the last segment of the in-archive path and
/// `relative_path` carries all of it.
pub fn append_entries(node: &mut FileNode, entries: Vec<ArchiveEntry>) -> usize {
    let count = entries.len();
    for entry in entries {
        let full_name = entry.name.trim_end_matches('/');
        let name = full_name.rsplit('/').next().unwrap_or(full_name);
        let relative_path = node.child_path(full_name);
        node.add_child(FileNode::archive_entry(
            name,
            relative_path,
            entry.size,
            entry.modified_at,
        ));
    }
    count
}
