//! Per-item and per-run notifications.
//!
//! The core reports progress through an [`Observer`] handed to each
//! operation; it never formats text for the user itself.

use crate::backup::{BackupEntry, BackupSummary};
use crate::catalog::CatalogSummary;
use crate::digest::Digest;
use crate::Error;
use std::path::Path;
use tracing::{debug, info, warn};

/// Receives notifications from tree reading, cataloging and backups.
/// Every method defaults to doing nothing.
pub trait Observer {
    fn directory_found(&self, _path: &Path) {}

    fn file_found(&self, _path: &Path) {}

    fn archive_found(&self, _relative_path: &str) {}

    fn archive_entry_found(&self, _relative_path: &str) {}

    fn digest_computed(&self, _relative_path: &str, _digest: &Digest) {}

    fn backup_started(&self, _snapshot_path: &Path, _storage_root: &Path) {}

    fn backup_entry_created(&self, _entry: &BackupEntry) {}

    fn backup_finished(&self, _summary: &BackupSummary) {}

    fn catalog_finished(&self, _summary: &CatalogSummary) {}

    /// A recoverable failure; the operation carries on with the next item.
    fn item_failed(&self, _item: &str, _error: &Error) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}

/// Forwards every notification to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn directory_found(&self, path: &Path) {
        debug!("Found directory: {}", path.display());
    }

    fn file_found(&self, path: &Path) {
        debug!("Found file: {}", path.display());
    }

    fn archive_found(&self, relative_path: &str) {
        debug!("Found archive: {}", relative_path);
    }

    fn archive_entry_found(&self, relative_path: &str) {
        debug!("Found archive entry: {}", relative_path);
    }

    fn digest_computed(&self, relative_path: &str, digest: &Digest) {
        debug!("{} {}", digest, relative_path);
    }

    fn backup_started(&self, snapshot_path: &Path, storage_root: &Path) {
        info!(
            "Writing snapshot {} (storage {})",
            snapshot_path.display(),
            storage_root.display()
        );
    }

    fn backup_entry_created(&self, entry: &BackupEntry) {
        debug!(
            hash_computed = entry.hash_computed,
            found_in_index = entry.found_in_index,
            stored = entry.stored,
            "{} {}",
            entry.record.short_digest(),
            entry.record.relative_path
        );
    }

    fn backup_finished(&self, summary: &BackupSummary) {
        info!(
            "Backup finished: {} files, {} hashed, {} reused, {} new blobs, {} skipped",
            summary.files,
            summary.hashes_computed,
            summary.hashes_reused,
            summary.blobs_written,
            summary.skipped
        );
    }

    fn catalog_finished(&self, summary: &CatalogSummary) {
        info!(
            "Catalog finished: {} directories, {} files, {} archives, {} errors",
            summary.directories, summary.files, summary.archives, summary.errors
        );
    }

    fn item_failed(&self, item: &str, error: &Error) {
        warn!("Skipping {}: {}", item, error);
    }
}
