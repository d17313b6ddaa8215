use chrono::{DateTime, TimeZone, Utc};
use snapcat_core::memory::MemoryFileSystem;
use snapcat_core::{
    BackupOptions, BackupRoot, Digest, DigestAlgorithm, DigestEngine, NullObserver, Result,
    StreamingDigestEngine,
};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const HELLO_WORLD_SHA256: &str = "64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aeca37f3c";

#[derive(Default)]
struct CountingEngine {
    calls: AtomicUsize,
}

impl DigestEngine for CountingEngine {
    fn compute(&self, algorithm: DigestAlgorithm, reader: &mut dyn Read) -> Result<Digest> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StreamingDigestEngine.compute(algorithm, reader)
    }
}

fn file_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap()
}

fn options(hour: u32) -> BackupOptions {
    BackupOptions {
        started_at: Some(Utc.with_ymd_and_hms(2019, 9, 1, hour, 0, 0).unwrap()),
        ..BackupOptions::named("test")
    }
}

fn setup() -> (MemoryFileSystem, BackupRoot) {
    let fs = MemoryFileSystem::new("/work");
    fs.add_file("/work/source/1.txt", b"Hello world", file_time());
    let root = BackupRoot::new(Arc::new(fs.clone()), "/work/backup");
    (fs, root)
}

#[test]
fn test_first_backup_writes_manifest_and_blob() {
    let (fs, root) = setup();
    let engine = CountingEngine::default();

    let summary = root
        .run_backup(Path::new("/work/source"), &options(10), &engine, &NullObserver)
        .unwrap();

    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.hashes_computed, 1);
    assert_eq!(summary.blobs_written, 1);
    assert!(summary.previous_snapshot.is_none());

    assert_eq!(
        summary.snapshot_path,
        Path::new("/work/backup/snapshots/test/2019-09-01_10-00-00")
    );
    assert_eq!(
        fs.read_file_string(&summary.snapshot_path).unwrap(),
        format!("{} 2018-04-22T18:05:12.0000000Z 11 1.txt\n", HELLO_WORLD_SHA256)
    );

    let blob = format!("/work/backup/file_storage/64/{}", HELLO_WORLD_SHA256);
    assert_eq!(fs.read_file(&blob).unwrap(), b"Hello world");
}

#[test]
fn test_second_backup_reuses_hash_and_skips_storage() {
    let (fs, root) = setup();
    root.run_backup(Path::new("/work/source"), &options(10), &StreamingDigestEngine, &NullObserver)
        .unwrap();

    let engine = CountingEngine::default();
    let summary = root
        .run_backup(Path::new("/work/source"), &options(11), &engine, &NullObserver)
        .unwrap();

    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.hashes_reused, 1);
    assert_eq!(summary.index_hits, 1);
    assert_eq!(summary.blobs_written, 0);
    assert_eq!(
        summary.previous_snapshot.as_deref(),
        Some(Path::new("/work/backup/snapshots/test/2019-09-01_10-00-00"))
    );

    assert_eq!(
        fs.read_file_string(&summary.snapshot_path).unwrap(),
        format!("{} 2018-04-22T18:05:12.0000000Z 11 1.txt\n", HELLO_WORLD_SHA256)
    );
    assert_eq!(fs.files_under("/work/backup/file_storage").len(), 1);
    assert_eq!(root.snapshots().generations("test").unwrap().len(), 2);
}

#[test]
fn test_touched_file_is_rehashed_but_not_stored_again() {
    let (fs, root) = setup();
    root.run_backup(Path::new("/work/source"), &options(10), &StreamingDigestEngine, &NullObserver)
        .unwrap();

    let later = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    fs.add_file("/work/source/1.txt", b"Hello world", later);

    let engine = CountingEngine::default();
    let summary = root
        .run_backup(Path::new("/work/source"), &options(11), &engine, &NullObserver)
        .unwrap();

    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.index_hits, 1);
    assert_eq!(summary.blobs_written, 0);
    assert!(
        fs.read_file_string(&summary.snapshot_path)
            .unwrap()
            .contains(" 2019-01-01T00:00:00.0000000Z 11 1.txt")
    );
}
