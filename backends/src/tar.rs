use chrono::DateTime;
use flate2::read::GzDecoder;
use snapcat_core::archive::{ArchiveEntry, ArchiveReader};
use snapcat_core::{Error, Result};
use std::io::Read;
use tracing::debug;

/// Lists the members of `.tar`, `.tar.gz` and `.tgz` streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiveReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
}

impl TarArchiveReader {
    pub fn new() -> Self {
        Self
    }

    fn compression(file_name: &str) -> Option<Compression> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if lower.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }

    fn list<R: Read>(file_name: &str, stream: R) -> Result<Vec<ArchiveEntry>> {
        let mut archive = tar::Archive::new(stream);
        let mut entries = Vec::new();

        let members = archive
            .entries()
            .map_err(|e| Error::Archive(format!("{}: {}", file_name, e)))?;
        for member in members {
            let member = member.map_err(|e| Error::Archive(format!("{}: {}", file_name, e)))?;
            let header = member.header();

            let name = member
                .path()
                .map_err(|e| Error::Archive(format!("{}: {}", file_name, e)))?
                .to_string_lossy()
                .replace('\\', "/");
            let size = if header.entry_type().is_dir() {
                None
            } else {
                header.size().ok()
            };
            let modified_at = header
                .mtime()
                .ok()
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0));

            entries.push(ArchiveEntry {
                name,
                size,
                modified_at,
            });
        }

        debug!("{}: {} entries", file_name, entries.len());
        Ok(entries)
    }
}

impl ArchiveReader for TarArchiveReader {
    fn enumerate_entries(&self, file_name: &str, stream: Box<dyn Read>) -> Result<Vec<ArchiveEntry>> {
        match Self::compression(file_name) {
            Some(Compression::None) => Self::list(file_name, stream),
            Some(Compression::Gzip) => Self::list(file_name, GzDecoder::new(stream)),
            None => Err(Error::Archive(format!(
                "{}: no decoder for this archive format",
                file_name
            ))),
        }
    }
}
