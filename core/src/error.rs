use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported hash function {name}")]
    UnsupportedAlgorithm { name: String },

    #[error("Hash is {actual} bytes. Expected hash to have length {expected} bytes")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Blob not found in storage: {digest}")]
    BlobNotFound { digest: String },

    #[error("Invalid manifest line {line:?}: {reason}")]
    InvalidManifestLine { line: String, reason: String },

    #[error("Path {path:?} cannot be written to a manifest: {reason}")]
    InvalidRecordPath { path: String, reason: &'static str },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Snapshot already exists at {path}")]
    SnapshotExists { path: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn manifest_line(line: &str, reason: impl Into<String>) -> Self {
        Error::InvalidManifestLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
