//! Incremental backup and snapshot pull.
//!
//! A backup reads the source tree, reuses digests from the latest snapshot
//! of the same name where size and modification time still match, hashes
//! the rest, writes every body the dedup index does not know yet into file
//! storage and appends one manifest line per file.

use crate::catalog::hash_file;
use crate::digest::{DigestAlgorithm, DigestEngine};
use crate::events::Observer;
use crate::fs::FileSystem;
use crate::index::DedupIndex;
use crate::manifest::{check_relative_path, SnapshotRecord};
use crate::reuse::HashReuse;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::storage::FileStorage;
use crate::tree::read_tree;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::btree_map::{BTreeMap, Entry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub snapshot_name: String,
    pub search_pattern: String,
    pub algorithm: DigestAlgorithm,
    /// Generation time of the new manifest. `None` uses the current time.
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            snapshot_name: "default".to_string(),
            search_pattern: "*".to_string(),
            algorithm: DigestAlgorithm::BACKUP_DEFAULT,
            started_at: None,
        }
    }
}

impl BackupOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            snapshot_name: name.into(),
            ..Self::default()
        }
    }
}

/// Outcome for one backed-up file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub record: SnapshotRecord,
    /// The digest was computed rather than reused from the previous snapshot.
    pub hash_computed: bool,
    /// The digest was already in the dedup index.
    pub found_in_index: bool,
    /// A new blob was written to storage.
    pub stored: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub files: usize,
    pub hashes_computed: usize,
    pub hashes_reused: usize,
    pub index_hits: usize,
    pub blobs_written: usize,
    pub skipped: usize,
    pub snapshot_path: PathBuf,
    pub previous_snapshot: Option<PathBuf>,
}

impl BackupSummary {
    pub fn has_skipped(&self) -> bool {
        self.skipped > 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub records: usize,
    pub blobs_copied: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub source_snapshot: PathBuf,
    pub snapshot_path: PathBuf,
}

/// A backup destination: file storage plus snapshot manifests under one root.
pub struct BackupRoot {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    storage: FileStorage,
    snapshots: SnapshotStore,
}

impl BackupRoot {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            storage: FileStorage::new(Arc::clone(&fs), &root),
            snapshots: SnapshotStore::new(Arc::clone(&fs), &root),
            fs,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Dedup index holding every blob already in storage.
    pub fn load_index(&self, algorithm: DigestAlgorithm) -> Result<DedupIndex> {
        let mut index = DedupIndex::new(algorithm);
        for hex_digest in self.storage.stored_digests()? {
            let bytes = hex::decode(&hex_digest)
                .map_err(|e| Error::InvalidDigest(format!("{}: {}", hex_digest, e)))?;
            if bytes.len() != algorithm.digest_len() {
                debug!("Ignoring {} blob {} in {} index", bytes.len(), hex_digest, algorithm);
                continue;
            }
            index.add(&bytes)?;
        }
        debug!("Loaded {} digests from {}", index.len(), self.storage.root().display());
        Ok(index)
    }

    fn previous_records(
        &self,
        name: &str,
        observer: &dyn Observer,
    ) -> Result<(Option<Snapshot>, Vec<SnapshotRecord>)> {
        match self.snapshots.find_snapshot(name, None)? {
            Some(snapshot) => {
                let records: Vec<SnapshotRecord> =
                    self.snapshots.read_snapshot(&snapshot)?.records(observer).collect();
                debug!("{} records in {}", records.len(), snapshot.path.display());
                Ok((Some(snapshot), records))
            }
            None => Ok((None, Vec::new())),
        }
    }

    /// Backs up the tree under `source`.
    ///
    /// Files that cannot be read, paths a manifest line cannot hold and
    /// directories that cannot be listed are reported through `observer`,
    /// counted in [`BackupSummary::skipped`] and left out of the manifest. Index
    /// invariant violations and manifest write failures abort the run.
    pub fn run_backup(
        &self,
        source: &Path,
        options: &BackupOptions,
        engine: &dyn DigestEngine,
        observer: &dyn Observer,
    ) -> Result<BackupSummary> {
        let algorithm = options.algorithm;
        let (mut tree, unlisted) = read_tree(self.fs.as_ref(), source, &options.search_pattern, observer)?;

        let (previous, records) = self.previous_records(&options.snapshot_name, observer)?;
        let reuse = HashReuse::new(algorithm, records);
        reuse.apply(&mut tree);

        let mut index = self.load_index(algorithm)?;

        let started_at = options.started_at.unwrap_or_else(Utc::now);
        let mut writer = self.snapshots.create_writer(&options.snapshot_name, started_at)?;
        observer.backup_started(writer.path(), self.storage.root());

        let mut summary = BackupSummary {
            previous_snapshot: previous.map(|snapshot| snapshot.path),
            skipped: unlisted,
            ..BackupSummary::default()
        };

        for node in tree.descendants().filter(|node| node.is_file()) {
            if let Err(e) = check_relative_path(&node.relative_path) {
                observer.item_failed(&node.relative_path, &e);
                summary.skipped += 1;
                continue;
            }
            let path = self.fs.combine_path(source, &node.relative_path);

            let (digest, hash_computed) = match node.digest(algorithm) {
                Some(digest) => (digest.clone(), false),
                None => match hash_file(self.fs.as_ref(), &path, algorithm, engine) {
                    Ok(digest) => {
                        observer.digest_computed(&node.relative_path, &digest);
                        (digest, true)
                    }
                    Err(e) => {
                        observer.item_failed(&node.relative_path, &e);
                        summary.skipped += 1;
                        continue;
                    }
                },
            };

            let found_in_index = index.contains(digest.as_bytes());
            let mut stored = false;
            if !found_in_index {
                match self.storage.add_file(&path, &digest) {
                    Ok(blob) => stored = blob.newly_written,
                    Err(e) => {
                        observer.item_failed(&node.relative_path, &e);
                        summary.skipped += 1;
                        continue;
                    }
                }
                index.add_digest(&digest)?;
            }

            let record = SnapshotRecord::new(
                &digest,
                node.modified_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                node.size.unwrap_or(0),
                node.relative_path.clone(),
            );
            writer.append(&record)?;

            summary.files += 1;
            if hash_computed {
                summary.hashes_computed += 1;
            } else {
                summary.hashes_reused += 1;
            }
            if found_in_index {
                summary.index_hits += 1;
            }
            if stored {
                summary.blobs_written += 1;
            }

            observer.backup_entry_created(&BackupEntry {
                record,
                hash_computed,
                found_in_index,
                stored,
            });
        }

        summary.snapshot_path = writer.finish()?;
        if summary.has_skipped() {
            warn!("{} files were skipped", summary.skipped);
        }
        observer.backup_finished(&summary);
        Ok(summary)
    }

    /// Copies snapshot `name` from `source` into this root without rehashing:
    /// missing blobs are fetched with [`FileStorage::copy_from`] and the
    /// records are written to a new manifest here.
    ///
    /// Returns `Ok(None)` when the source has no matching snapshot.
    pub fn pull_snapshot(
        &self,
        source: &BackupRoot,
        name: &str,
        date: Option<DateTime<Utc>>,
        started_at: DateTime<Utc>,
        observer: &dyn Observer,
    ) -> Result<Option<PullSummary>> {
        let Some(snapshot) = source.snapshots.find_snapshot(name, date)? else {
            info!("No snapshot {} in {}", name, source.root.display());
            return Ok(None);
        };

        // Keyed by digest length.
        let mut indexes: BTreeMap<usize, DedupIndex> = BTreeMap::new();
        let mut writer = self.snapshots.create_writer(name, started_at)?;
        observer.backup_started(writer.path(), self.storage.root());

        let mut summary = PullSummary {
            source_snapshot: snapshot.path.clone(),
            ..PullSummary::default()
        };

        for record in source.snapshots.read_snapshot(&snapshot)?.records(observer) {
            let bytes = match record.digest_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    observer.item_failed(&record.relative_path, &e);
                    summary.skipped += 1;
                    continue;
                }
            };

            let Some(algorithm) = DigestAlgorithm::for_digest_len(bytes.len()) else {
                let e = Error::InvalidDigest(format!(
                    "{}: no algorithm produces {} byte digests",
                    record.digest,
                    bytes.len()
                ));
                observer.item_failed(&record.relative_path, &e);
                summary.skipped += 1;
                continue;
            };
            let index = match indexes.entry(bytes.len()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.load_index(algorithm)?),
            };

            if index.contains(&bytes) {
                summary.already_present += 1;
            } else {
                match self.storage.copy_from(&source.storage, &record) {
                    Ok(blob) if blob.newly_written => summary.blobs_copied += 1,
                    Ok(_) => summary.already_present += 1,
                    Err(e) => {
                        observer.item_failed(&record.relative_path, &e);
                        summary.skipped += 1;
                        continue;
                    }
                }
                index.add(&bytes)?;
            }

            writer.append(&record)?;
            summary.records += 1;
        }

        summary.snapshot_path = writer.finish()?;
        info!(
            "Pulled {}: {} records, {} blobs copied, {} skipped",
            snapshot.summary(),
            summary.records,
            summary.blobs_copied,
            summary.skipped
        );
        Ok(Some(summary))
    }
}
