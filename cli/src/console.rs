use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use snapcat_core::{
    BackupEntry, BackupSummary, CatalogSummary, Digest, Error, Observer, TracingObserver,
};
use std::cell::Cell;
use std::path::Path;

/// One line per backed-up file: `<n>/<total> <H><N> <hash8> <size> <path>`.
pub fn entry_line(counter: u64, total: u64, entry: &BackupEntry) -> String {
    format!(
        "{}/{} {}{} {} {} {}",
        counter,
        total,
        if entry.hash_computed { 'H' } else { ' ' },
        if entry.stored { 'N' } else { ' ' },
        entry.record.short_digest(),
        entry.record.size,
        entry.record.relative_path
    )
}

pub fn backup_summary_lines(summary: &BackupSummary) -> Vec<String> {
    vec![
        format!("Snapshot: {}", summary.snapshot_path.display()),
        format!(
            "Files: {} ({} hashed, {} reused)",
            summary.files, summary.hashes_computed, summary.hashes_reused
        ),
        format!(
            "Storage: {} new blobs, {} already stored",
            summary.blobs_written, summary.index_hits
        ),
    ]
}

pub fn catalog_summary_lines(summary: &CatalogSummary) -> Vec<String> {
    vec![
        format!("{} directories processed", summary.directories),
        format!("{} archives found", summary.archives),
        format!("{} files found ({})", summary.files, HumanBytes(summary.total_size)),
        format!("{} archive entries found", summary.archive_entries),
    ]
}

/// Draws progress for catalog and backup runs and mirrors every event to
/// `tracing`.
pub struct ConsoleObserver {
    bar: ProgressBar,
    total: u64,
    counter: Cell<u64>,
    quiet: bool,
    tracing: TracingObserver,
}

impl ConsoleObserver {
    /// Progress bar over `total` files.
    pub fn with_total(total: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos:>7}/{len:7} {msg}") {
            bar.set_style(style);
        }
        Self::with_bar(bar, total, quiet)
    }

    /// Spinner for runs whose size is unknown up front.
    pub fn spinner(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        Self::with_bar(bar, 0, quiet)
    }

    fn with_bar(bar: ProgressBar, total: u64, quiet: bool) -> Self {
        Self {
            bar,
            total,
            counter: Cell::new(0),
            quiet,
            tracing: TracingObserver,
        }
    }

    fn print(&self, line: String) {
        if !self.quiet {
            self.bar.println(line);
        }
    }
}

impl Observer for ConsoleObserver {
    fn directory_found(&self, path: &Path) {
        self.tracing.directory_found(path);
    }

    fn file_found(&self, path: &Path) {
        self.tracing.file_found(path);
        self.bar.set_message(format!("Scanning {}", path.display()));
        self.bar.tick();
    }

    fn archive_found(&self, relative_path: &str) {
        self.tracing.archive_found(relative_path);
    }

    fn archive_entry_found(&self, relative_path: &str) {
        self.tracing.archive_entry_found(relative_path);
    }

    fn digest_computed(&self, relative_path: &str, digest: &Digest) {
        self.tracing.digest_computed(relative_path, digest);
        self.bar.set_message(relative_path.to_string());
        self.bar.tick();
    }

    fn backup_started(&self, snapshot_path: &Path, storage_root: &Path) {
        self.tracing.backup_started(snapshot_path, storage_root);
    }

    fn backup_entry_created(&self, entry: &BackupEntry) {
        self.tracing.backup_entry_created(entry);
        let counter = self.counter.get() + 1;
        self.counter.set(counter);
        self.print(entry_line(counter, self.total, entry));
        self.bar.inc(1);
    }

    fn backup_finished(&self, summary: &BackupSummary) {
        self.tracing.backup_finished(summary);
        self.bar.finish_and_clear();
    }

    fn catalog_finished(&self, summary: &CatalogSummary) {
        self.tracing.catalog_finished(summary);
        self.bar.finish_and_clear();
    }

    fn item_failed(&self, item: &str, error: &Error) {
        self.tracing.item_failed(item, error);
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use snapcat_core::{DigestAlgorithm, SnapshotRecord};

    fn entry(hash_computed: bool, stored: bool) -> BackupEntry {
        let digest = DigestAlgorithm::Sha256.compute_bytes(b"Hello world");
        let time = Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap();
        BackupEntry {
            record: SnapshotRecord::new(&digest, time, 11, "dir/1.txt"),
            hash_computed,
            found_in_index: !stored,
            stored,
        }
    }

    #[test]
    fn test_entry_line_flags() {
        assert_eq!(entry_line(1, 3, &entry(true, true)), "1/3 HN 64ec88ca 11 dir/1.txt");
        assert_eq!(entry_line(2, 3, &entry(false, false)), "2/3    64ec88ca 11 dir/1.txt");
        assert_eq!(entry_line(3, 3, &entry(true, false)), "3/3 H  64ec88ca 11 dir/1.txt");
    }

    #[test]
    fn test_observer_counts_entries() {
        let observer = ConsoleObserver::with_total(2, true);
        observer.backup_entry_created(&entry(true, true));
        observer.backup_entry_created(&entry(false, false));
        assert_eq!(observer.counter.get(), 2);
    }
}
