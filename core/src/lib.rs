pub mod archive;
pub mod backup;
pub mod catalog;
pub mod digest;
pub mod error;
pub mod events;
pub mod fs;
pub mod index;
pub mod manifest;
pub mod memory;
pub mod reuse;
pub mod snapshot;
pub mod storage;
pub mod tree;
pub mod walker;

pub use archive::{ArchiveEntry, ArchiveExtensions, ArchiveReader};
pub use backup::{BackupEntry, BackupOptions, BackupRoot, BackupSummary, PullSummary};
pub use catalog::{catalog, CatalogOptions, CatalogSummary};
pub use digest::{Digest, DigestAlgorithm, DigestEngine, StreamingDigestEngine};
pub use error::{Error, Result};
pub use events::{NullObserver, Observer, TracingObserver};
pub use fs::{FileSystem, FsEntry};
pub use index::DedupIndex;
pub use manifest::{ManifestReader, ManifestWriter, SnapshotRecord};
pub use snapshot::{Snapshot, SnapshotStore};
pub use storage::{BlobSource, FileStorage, StoredBlob};
pub use tree::FileNode;
