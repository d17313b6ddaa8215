use crate::digest::Digest;
use crate::fs::FileSystem;
use crate::manifest::SnapshotRecord;
use crate::{Error, Result};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Directory under the backup root that holds blobs.
pub const STORAGE_DIR: &str = "file_storage";

const PARTIAL_SUFFIX: &str = ".partial";

/// A file body held in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub digest: String,
    pub path: PathBuf,
    /// `false` when the blob was already present and nothing was copied.
    pub newly_written: bool,
}

/// Something that can stream the body of a blob it holds.
///
/// Sources only supply bytes. The receiving storage creates the temp file on
/// its own filesystem and renames it into place.
pub trait BlobSource {
    fn write_blob(&self, record: &SnapshotRecord, sink: &mut dyn Write) -> Result<()>;
}

/// Content-addressed blob store.
///
/// Layout:
///
/// ```text
/// <backup-root>/
/// └── file_storage/
///     └── 64/
///         └── 64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aeca37f3c
/// ```
///
/// A blob is never rewritten: if its path exists the content is trusted to
/// match the digest. New blobs are written to a `.partial` file in the shard
/// directory and renamed into place, so a failed copy never leaves a blob
/// visible at its final path.
pub struct FileStorage {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FileStorage {
    pub fn new(fs: Arc<dyn FileSystem>, backup_root: &Path) -> Self {
        Self {
            root: backup_root.join(STORAGE_DIR),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<first two hex chars>/<full hex digest>`
    pub fn blob_path(&self, hex_digest: &str) -> Result<PathBuf> {
        let hex_digest = hex_digest.to_ascii_lowercase();
        if hex_digest.len() < 2 || hex::decode(&hex_digest).is_err() {
            return Err(Error::InvalidDigest(hex_digest));
        }
        Ok(self.root.join(&hex_digest[..2]).join(&hex_digest))
    }

    pub fn contains(&self, hex_digest: &str) -> Result<bool> {
        Ok(self.fs.file_exists(&self.blob_path(hex_digest)?))
    }

    /// Stores the file at `local_path` under `digest`.
    pub fn add_file(&self, local_path: &Path, digest: &Digest) -> Result<StoredBlob> {
        let hex_digest = digest.to_hex();
        let destination = self.blob_path(&hex_digest)?;
        if self.fs.file_exists(&destination) {
            debug!("Blob {} already stored", hex_digest);
            return Ok(Self::existing(hex_digest, destination));
        }

        let mut source = self.fs.open_for_read(local_path)?;
        self.write_atomically(&destination, |temp| {
            let mut sink = self.fs.create_for_write(temp)?;
            io::copy(&mut source, &mut sink)?;
            sink.flush()?;
            Ok(())
        })?;

        Ok(StoredBlob {
            digest: hex_digest,
            path: destination,
            newly_written: true,
        })
    }

    /// Stores the body read from `reader` under `digest`.
    pub fn add_stream(&self, reader: &mut dyn Read, digest: &Digest) -> Result<StoredBlob> {
        let hex_digest = digest.to_hex();
        let destination = self.blob_path(&hex_digest)?;
        if self.fs.file_exists(&destination) {
            return Ok(Self::existing(hex_digest, destination));
        }

        self.write_atomically(&destination, |temp| {
            let mut sink = self.fs.create_for_write(temp)?;
            io::copy(reader, &mut sink)?;
            sink.flush()?;
            Ok(())
        })?;

        Ok(StoredBlob {
            digest: hex_digest,
            path: destination,
            newly_written: true,
        })
    }

    /// Pulls the blob for `record` out of `source` unless it is already here.
    /// The digest comes from the record; nothing is rehashed.
    pub fn copy_from(&self, source: &dyn BlobSource, record: &SnapshotRecord) -> Result<StoredBlob> {
        let destination = self.blob_path(&record.digest)?;
        if self.fs.file_exists(&destination) {
            return Ok(Self::existing(record.digest.clone(), destination));
        }

        self.write_atomically(&destination, |temp| {
            let mut sink = self.fs.create_for_write(temp)?;
            source.write_blob(record, sink.as_mut())?;
            sink.flush()?;
            Ok(())
        })?;

        Ok(StoredBlob {
            digest: record.digest.clone(),
            path: destination,
            newly_written: true,
        })
    }

    pub fn open_for_read(&self, hex_digest: &str) -> Result<Box<dyn Read>> {
        let path = self.blob_path(hex_digest)?;
        if !self.fs.file_exists(&path) {
            return Err(Error::BlobNotFound {
                digest: hex_digest.to_string(),
            });
        }
        self.fs.open_for_read(&path)
    }

    /// Hex digests of every blob present, in ascending order.
    pub fn stored_digests(&self) -> Result<Vec<String>> {
        if !self.fs.directory_exists(&self.root) {
            return Ok(Vec::new());
        }

        let mut digests = Vec::new();
        for shard in self.fs.enumerate_entries(&self.root, "*")? {
            if !shard.is_directory || !is_shard_name(&shard.name) {
                continue;
            }
            for blob in self.fs.enumerate_entries(&shard.path, "*")? {
                if blob.is_directory || blob.name.ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                if blob.name.len() % 2 == 0
                    && blob.name.starts_with(&shard.name)
                    && hex::decode(&blob.name).is_ok()
                {
                    digests.push(blob.name);
                } else {
                    debug!("Ignoring stray file in storage: {}", blob.path.display());
                }
            }
        }
        digests.sort();
        Ok(digests)
    }

    fn existing(digest: String, path: PathBuf) -> StoredBlob {
        StoredBlob {
            digest,
            path,
            newly_written: false,
        }
    }

    fn write_atomically<F>(&self, destination: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let shard_dir = destination
            .parent()
            .ok_or_else(|| Error::Other(format!("no shard directory for {}", destination.display())))?;
        self.fs.create_directory(shard_dir)?;

        let mut temp_name = destination
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        temp_name.push(PARTIAL_SUFFIX);
        let temp = shard_dir.join(temp_name);

        if self.fs.file_exists(&temp) {
            self.fs.remove_file(&temp)?;
        }

        if let Err(e) = write(&temp) {
            if self.fs.file_exists(&temp) {
                if let Err(cleanup) = self.fs.remove_file(&temp) {
                    warn!("Failed to remove {}: {}", temp.display(), cleanup);
                }
            }
            return Err(e);
        }

        self.fs.rename(&temp, destination)
    }
}

impl BlobSource for FileStorage {
    fn write_blob(&self, record: &SnapshotRecord, sink: &mut dyn Write) -> Result<()> {
        let mut source = self.open_for_read(&record.digest)?;
        io::copy(&mut source, sink)?;
        Ok(())
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}
