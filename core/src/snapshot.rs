use crate::fs::FileSystem;
use crate::manifest::{ManifestReader, ManifestWriter};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Directory under the backup root that holds manifests.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Manifest file names: fixed width, so string order is chronological order.
pub const GENERATION_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const GENERATION_PATTERN: &str = "????-??-??_??-??-??";

/// One manifest: `<backup-root>/snapshots/<name>/<generation>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub generation: String,
    pub path: PathBuf,
}

impl Snapshot {
    pub fn time(&self) -> Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.generation, GENERATION_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| Error::InvalidDate(format!("{}: {}", self.generation, e)))
    }

    pub fn summary(&self) -> String {
        format!("{} @ {}", self.name, self.generation)
    }
}

pub fn format_generation(time: &DateTime<Utc>) -> String {
    time.format(GENERATION_FORMAT).to_string()
}

/// Parses a user-supplied date. Accepts `2019-07-01`, `2019-07-01 12:30:00`,
/// `2019-07-01T12:30:00`, RFC 3339 and the generation format itself.
/// Values without an offset are taken as UTC.
pub fn parse_snapshot_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", GENERATION_FORMAT] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::InvalidDate(value.to_string()))
}

/// Locates, lists, opens and creates snapshot manifests under a backup root.
pub struct SnapshotStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(fs: Arc<dyn FileSystem>, backup_root: &Path) -> Self {
        Self {
            root: backup_root.join(SNAPSHOTS_DIR),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_directory(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Names of all snapshot sets, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.fs.directory_exists(&self.root) {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = self
            .fs
            .enumerate_entries(&self.root, "*")?
            .into_iter()
            .filter(|entry| entry.is_directory)
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every manifest of `name`, oldest first.
    pub fn generations(&self, name: &str) -> Result<Vec<Snapshot>> {
        let directory = self.snapshot_directory(name)?;
        if !self.fs.directory_exists(&directory) {
            return Ok(Vec::new());
        }

        let mut snapshots: Vec<Snapshot> = self
            .fs
            .enumerate_entries(&directory, GENERATION_PATTERN)?
            .into_iter()
            .filter(|entry| !entry.is_directory)
            .map(|entry| Snapshot {
                name: name.to_string(),
                generation: entry.name,
                path: entry.path,
            })
            .collect();
        snapshots.sort_by(|a, b| a.generation.cmp(&b.generation));
        Ok(snapshots)
    }

    /// The latest manifest of `name`, or the latest one at or before `date`.
    /// `None` when no manifest qualifies.
    pub fn find_snapshot(&self, name: &str, date: Option<DateTime<Utc>>) -> Result<Option<Snapshot>> {
        let generations = self.generations(name)?;

        let found = match date {
            None => generations.into_iter().last(),
            Some(date) => {
                let cutoff = format_generation(&date);
                generations
                    .into_iter()
                    .filter(|snapshot| snapshot.generation.as_str() <= cutoff.as_str())
                    .last()
            }
        };

        match &found {
            Some(snapshot) => debug!("Selected snapshot {}", snapshot.path.display()),
            None => debug!("No snapshot found for {}", name),
        }
        Ok(found)
    }

    pub fn read_snapshot(&self, snapshot: &Snapshot) -> Result<ManifestReader<Box<dyn Read>>> {
        let stream = self.fs.open_for_read(&snapshot.path)?;
        Ok(ManifestReader::new(stream))
    }

    /// Creates the manifest for a new generation of `name`.
    pub fn create_writer(&self, name: &str, generated_at: DateTime<Utc>) -> Result<ManifestWriter> {
        let directory = self.snapshot_directory(name)?;
        self.fs.create_directory(&directory)?;

        let path = directory.join(format_generation(&generated_at));
        if self.fs.file_exists(&path) {
            return Err(Error::SnapshotExists {
                path: path.display().to_string(),
            });
        }

        let sink = self.fs.create_for_write(&path)?;
        Ok(ManifestWriter::new(path, sink))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\']);
    if invalid {
        return Err(Error::Other(format!("Invalid snapshot name: {:?}", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFileSystem;
    use chrono::TimeZone;

    fn store_with(generations: &[&str]) -> (MemoryFileSystem, SnapshotStore) {
        let fs = MemoryFileSystem::default();
        for generation in generations {
            fs.set_file(format!("/backup/snapshots/docs/{}", generation), "");
        }
        let store = SnapshotStore::new(Arc::new(fs.clone()), Path::new("/backup"));
        (fs, store)
    }

    #[test]
    fn test_generation_format_is_sortable() {
        let early = Utc.with_ymd_and_hms(2019, 9, 1, 8, 5, 3).unwrap();
        let late = Utc.with_ymd_and_hms(2019, 10, 1, 0, 0, 0).unwrap();
        assert_eq!(format_generation(&early), "2019-09-01_08-05-03");
        assert!(format_generation(&early) < format_generation(&late));
    }

    #[test]
    fn test_select_latest() {
        let (_, store) = store_with(&["2020-01-01_00-00-00", "2019-01-01_00-00-00", "2019-06-01_00-00-00"]);
        let snapshot = store.find_snapshot("docs", None).unwrap().unwrap();
        assert_eq!(snapshot.generation, "2020-01-01_00-00-00");
        assert_eq!(snapshot.path, Path::new("/backup/snapshots/docs/2020-01-01_00-00-00"));
    }

    #[test]
    fn test_select_by_date() {
        let (_, store) = store_with(&["2019-01-01_00-00-00", "2019-06-01_00-00-00", "2020-01-01_00-00-00"]);

        let date = parse_snapshot_date("2019-07-01").unwrap();
        let snapshot = store.find_snapshot("docs", Some(date)).unwrap().unwrap();
        assert_eq!(snapshot.generation, "2019-06-01_00-00-00");

        let exact = parse_snapshot_date("2019-06-01_00-00-00").unwrap();
        let snapshot = store.find_snapshot("docs", Some(exact)).unwrap().unwrap();
        assert_eq!(snapshot.generation, "2019-06-01_00-00-00");

        let before_all = parse_snapshot_date("2018-12-31").unwrap();
        assert!(store.find_snapshot("docs", Some(before_all)).unwrap().is_none());
    }

    #[test]
    fn test_missing_name_is_absence() {
        let (_, store) = store_with(&[]);
        assert!(store.find_snapshot("nothing", None).unwrap().is_none());
        assert!(store.names().unwrap().is_empty());
    }

    #[test]
    fn test_other_files_are_ignored() {
        let (fs, store) = store_with(&["2019-01-01_00-00-00"]);
        fs.set_file("/backup/snapshots/docs/notes.txt", "");
        fs.set_file("/backup/snapshots/docs/2019-02-01_00-00-00.partial", "");

        let generations = store.generations("docs").unwrap();
        assert_eq!(generations.len(), 1);
        assert_eq!(store.names().unwrap(), vec!["docs"]);
    }

    #[test]
    fn test_create_writer_refuses_existing_generation() {
        let (_, store) = store_with(&["2019-01-01_00-00-00"]);
        let time = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            store.create_writer("docs", time),
            Err(Error::SnapshotExists { .. })
        ));

        let later = Utc.with_ymd_and_hms(2019, 1, 2, 0, 0, 0).unwrap();
        let writer = store.create_writer("docs", later).unwrap();
        assert_eq!(
            writer.path(),
            Path::new("/backup/snapshots/docs/2019-01-02_00-00-00")
        );
    }

    #[test]
    fn test_invalid_names() {
        let (_, store) = store_with(&[]);
        assert!(store.generations("../etc").is_err());
        assert!(store.generations("").is_err());
    }

    #[test]
    fn test_parse_snapshot_date_formats() {
        let expected = Utc.with_ymd_and_hms(2019, 7, 1, 12, 30, 0).unwrap();
        for input in [
            "2019-07-01T12:30:00",
            "2019-07-01 12:30:00",
            "2019-07-01T12:30:00Z",
            "2019-07-01T14:30:00+02:00",
            "2019-07-01_12-30-00",
        ] {
            assert_eq!(parse_snapshot_date(input).unwrap(), expected, "{}", input);
        }
        assert!(parse_snapshot_date("yesterday").is_err());
    }
}
