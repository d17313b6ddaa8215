//! Snapshot manifest format.
//!
//! One file per line, UTF-8, newline-terminated:
//!
//! ```text
//! <hex-digest> <yyyy-MM-ddTHH:mm:ss.fffffffZ> <size> <relative path>
//! ```
//!
//! The path is the remainder of the line and may contain spaces.
//! Timestamps carry 100 ns precision.

use crate::digest::Digest;
use crate::events::Observer;
use crate::{Error, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const NANOS_PER_TICK: u32 = 100;

/// Drops precision finer than the 100 ns the manifest can represent.
pub fn truncate_to_ticks(time: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = time.nanosecond();
    time.with_nanosecond(nanos - nanos % NANOS_PER_TICK)
        .unwrap_or(time)
}

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    let ticks = time.nanosecond().min(999_999_999) / NANOS_PER_TICK;
    format!("{}.{:07}Z", time.format("%Y-%m-%dT%H:%M:%S"), ticks)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if !value.ends_with('Z') {
        return Err(Error::InvalidDate(format!("{}: expected UTC 'Z' suffix", value)));
    }
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| Error::InvalidDate(format!("{}: {}", value, e)))?;
    Ok(truncate_to_ticks(parsed.with_timezone(&Utc)))
}

/// Checks that `path` survives a write and read-back as one manifest line.
pub fn check_relative_path(path: &str) -> Result<()> {
    let reason = if path.is_empty() {
        "empty path"
    } else if path.contains('\n') {
        "contains a line feed"
    } else if path.contains('\r') {
        "contains a carriage return"
    } else {
        return Ok(());
    };
    Err(Error::InvalidRecordPath {
        path: path.to_string(),
        reason,
    })
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub digest: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub relative_path: String,
}

impl SnapshotRecord {
    pub fn new(
        digest: &Digest,
        modified_at: DateTime<Utc>,
        size: u64,
        relative_path: impl Into<String>,
    ) -> Self {
        Self {
            digest: digest.to_hex(),
            modified_at: truncate_to_ticks(modified_at),
            size,
            relative_path: relative_path.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.splitn(4, ' ');
        let digest = fields.next().unwrap_or_default();
        let timestamp = fields
            .next()
            .ok_or_else(|| Error::manifest_line(line, "missing timestamp"))?;
        let size = fields
            .next()
            .ok_or_else(|| Error::manifest_line(line, "missing size"))?;
        let relative_path = fields
            .next()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| Error::manifest_line(line, "missing path"))?;

        if digest.is_empty() || hex::decode(digest).is_err() {
            return Err(Error::manifest_line(line, "digest is not a hex string"));
        }
        let modified_at = parse_timestamp(timestamp)
            .map_err(|e| Error::manifest_line(line, e.to_string()))?;
        let size = size
            .parse::<u64>()
            .map_err(|e| Error::manifest_line(line, format!("bad size: {}", e)))?;

        Ok(Self {
            digest: digest.to_ascii_lowercase(),
            modified_at,
            size,
            relative_path: relative_path.to_string(),
        })
    }

    pub fn digest_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.digest).map_err(|e| Error::InvalidDigest(format!("{}: {}", self.digest, e)))
    }

    pub fn short_digest(&self) -> &str {
        self.digest.get(..8).unwrap_or(&self.digest)
    }

    /// Last segment of the relative path.
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

impl FromStr for SnapshotRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SnapshotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.digest,
            format_timestamp(&self.modified_at),
            self.size,
            self.relative_path
        )
    }
}

/// Streams records out of a manifest.
///
/// Yields `Err(InvalidManifestLine)` for a line that does not parse and keeps
/// going; an I/O error is yielded once and ends the sequence.
pub struct ManifestReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<R: Read> ManifestReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Well-formed records only; failures are reported to `observer`.
    pub fn records<'o>(self, observer: &'o dyn Observer) -> impl Iterator<Item = SnapshotRecord> + 'o
    where
        R: 'o,
    {
        self.filter_map(move |item| match item {
            Ok(record) => Some(record),
            Err(e) => {
                observer.item_failed("manifest line", &e);
                None
            }
        })
    }
}

impl<R: Read> Iterator for ManifestReader<R> {
    type Item = Result<SnapshotRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    let line = match std::str::from_utf8(&self.buffer) {
                        Ok(line) => line.trim_end_matches(['\n', '\r']),
                        Err(_) => {
                            let lossy = String::from_utf8_lossy(&self.buffer).into_owned();
                            return Some(Err(Error::manifest_line(
                                lossy.trim_end(),
                                "not valid UTF-8",
                            )));
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(SnapshotRecord::parse(line));
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Appends records to a newly created manifest file.
pub struct ManifestWriter {
    path: PathBuf,
    out: BufWriter<Box<dyn Write>>,
    records_written: usize,
}

impl ManifestWriter {
    pub fn new(path: PathBuf, sink: Box<dyn Write>) -> Self {
        Self {
            path,
            out: BufWriter::new(sink),
            records_written: 0,
        }
    }

    /// Writes one line. Paths that [`check_relative_path`] rejects are
    /// refused and nothing is written.
    pub fn append(&mut self, record: &SnapshotRecord) -> Result<()> {
        check_relative_path(&record.relative_path)?;
        writeln!(self.out, "{}", record)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flushes buffered lines and returns the manifest path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.out.flush()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestAlgorithm;
    use crate::events::NullObserver;
    use chrono::TimeZone;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    const LINE: &str = "64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aeca37f3c 2018-04-22T18:05:12.0000000Z 11 1.txt";

    #[test]
    fn test_parse_reference_line() {
        let record = SnapshotRecord::parse(LINE).unwrap();
        assert_eq!(record.short_digest(), "64ec88ca");
        assert_eq!(
            record.modified_at,
            Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap()
        );
        assert_eq!(record.size, 11);
        assert_eq!(record.relative_path, "1.txt");
        assert_eq!(record.to_string(), LINE);
    }

    #[test]
    fn test_path_keeps_spaces() {
        let line = "ab 2019-01-01T00:00:00.1234567Z 1024 my docs/a file.txt";
        let record: SnapshotRecord = line.parse().unwrap();
        assert_eq!(record.relative_path, "my docs/a file.txt");
        assert_eq!(record.name(), "a file.txt");
        assert_eq!(record.modified_at.nanosecond(), 123_456_700);
        assert_eq!(record.to_string(), line);
    }

    #[test]
    fn test_timestamp_is_truncated_to_ticks() {
        let time = Utc.with_ymd_and_hms(2020, 2, 29, 23, 59, 59).unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(format_timestamp(&time), "2020-02-29T23:59:59.1234567Z");

        let digest = DigestAlgorithm::Sha256.compute_bytes(b"x");
        let record = SnapshotRecord::new(&digest, time, 1, "x");
        assert_eq!(record.modified_at.nanosecond(), 123_456_700);
    }

    #[test]
    fn test_malformed_lines() {
        for line in [
            "zz 2018-04-22T18:05:12.0000000Z 11 1.txt",
            "ab not-a-date 11 1.txt",
            "ab 2018-04-22T18:05:12.0000000Z eleven 1.txt",
            "ab 2018-04-22T18:05:12.0000000Z 11",
            "ab 2018-04-22T18:05:12.0000000+02:00 11 1.txt",
            "ab",
        ] {
            assert!(
                matches!(SnapshotRecord::parse(line), Err(Error::InvalidManifestLine { .. })),
                "{}",
                line
            );
        }
    }

    #[test]
    fn test_reader_skips_bad_lines() {
        let input = format!("{}\r\ngarbage line here\n\n{}\n", LINE, LINE.replace("1.txt", "2.txt"));
        let items: Vec<_> = ManifestReader::new(Cursor::new(input)).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert_eq!(items[2].as_ref().unwrap().relative_path, "2.txt");

        let input = format!("{}\ngarbage\n", LINE);
        let records: Vec<_> = ManifestReader::new(Cursor::new(input))
            .records(&NullObserver)
            .collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_reader_handles_invalid_utf8() {
        let mut input = b"ab 2018-04-22T18:05:12.0000000Z 1 \xff\xfe\n".to_vec();
        input.extend_from_slice(LINE.as_bytes());
        let records: Vec<_> = ManifestReader::new(Cursor::new(input))
            .records(&NullObserver)
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "1.txt");
    }

    #[test]
    fn test_append_refuses_paths_that_break_lines() {
        let sink = SharedSink::default();
        let mut writer = ManifestWriter::new(PathBuf::from("m"), Box::new(sink.clone()));
        let digest = DigestAlgorithm::Sha256.compute_bytes(b"Hello world");
        let time = Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap();

        for path in ["a\nb.txt", "a.txt\r", "a\rb.txt", ""] {
            let record = SnapshotRecord::new(&digest, time, 11, path);
            assert!(
                matches!(writer.append(&record), Err(Error::InvalidRecordPath { .. })),
                "{:?}",
                path
            );
        }
        writer.append(&SnapshotRecord::new(&digest, time, 11, "a b.txt")).unwrap();
        assert_eq!(writer.records_written(), 1);
        writer.finish().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        let read: Vec<_> = ManifestReader::new(Cursor::new(bytes)).collect();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].as_ref().unwrap().relative_path, "a b.txt");
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let sink = SharedSink::default();
        let mut writer = ManifestWriter::new(PathBuf::from("m"), Box::new(sink.clone()));

        let base = Utc.with_ymd_and_hms(2018, 4, 22, 18, 5, 12).unwrap();
        let written: Vec<SnapshotRecord> = (0..3u32)
            .map(|i| {
                let digest = DigestAlgorithm::Sha256.compute_bytes(&i.to_le_bytes());
                let time = base.with_nanosecond(i * 1_000_050).unwrap();
                SnapshotRecord::new(&digest, time, u64::from(i) * 10, format!("dir {}/f{}.txt", i, i))
            })
            .collect();
        for record in &written {
            writer.append(record).unwrap();
        }
        assert_eq!(writer.records_written(), 3);
        writer.finish().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        assert!(bytes.ends_with(b"\n"));
        let read: Vec<_> = ManifestReader::new(Cursor::new(bytes))
            .records(&NullObserver)
            .collect();
        assert_eq!(read, written);
    }
}
