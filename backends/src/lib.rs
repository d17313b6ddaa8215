pub mod local;
pub mod tar;

pub use local::{LocalFileSystem, ScanTotals};
pub use crate::tar::TarArchiveReader;
