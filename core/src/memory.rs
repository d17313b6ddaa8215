//! In-memory [`FileSystem`] used by tests and dry runs.

use crate::fs::{FileSystem, FsEntry, NamePattern};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedBytes = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Clone)]
enum MemoryNode {
    Directory {
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    },
    File {
        data: SharedBytes,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct MemoryState {
    current_dir: PathBuf,
    nodes: BTreeMap<PathBuf, MemoryNode>,
    unreadable: BTreeSet<PathBuf>,
}

/// A filesystem held entirely in memory. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new("/work")
    }
}

impl MemoryFileSystem {
    pub fn new<P: AsRef<Path>>(current_dir: P) -> Self {
        let current_dir = normalize(Path::new("/"), current_dir.as_ref());
        let fs = Self {
            state: Arc::new(Mutex::new(MemoryState {
                current_dir: current_dir.clone(),
                nodes: BTreeMap::new(),
                unreadable: BTreeSet::new(),
            })),
        };
        fs.lock().create_dirs(&current_dir, Utc::now());
        fs
    }

    /// Writes a file with an explicit modification time, creating parents.
    pub fn add_file<P: AsRef<Path>>(&self, path: P, contents: &[u8], modified_at: DateTime<Utc>) {
        let mut state = self.lock();
        let path = state.resolve(path.as_ref());
        if let Some(parent) = path.parent() {
            state.create_dirs(parent, modified_at);
        }
        state.nodes.insert(
            path,
            MemoryNode::File {
                data: Arc::new(Mutex::new(contents.to_vec())),
                created_at: modified_at,
                modified_at,
            },
        );
    }

    pub fn set_file<P: AsRef<Path>>(&self, path: P, contents: &str) {
        self.add_file(path, contents.as_bytes(), Utc::now());
    }

    pub fn add_directory<P: AsRef<Path>>(&self, path: P) {
        let mut state = self.lock();
        let path = state.resolve(path.as_ref());
        state.create_dirs(&path, Utc::now());
    }

    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Option<Vec<u8>> {
        let state = self.lock();
        match state.nodes.get(&state.resolve(path.as_ref())) {
            Some(MemoryNode::File { data, .. }) => Some(lock_bytes(data).clone()),
            _ => None,
        }
    }

    pub fn read_file_string<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        self.read_file(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Makes every later `open_for_read` of `path` fail, or every
    /// `enumerate_entries` when `path` is a directory.
    pub fn make_unreadable<P: AsRef<Path>>(&self, path: P) {
        let mut state = self.lock();
        let path = state.resolve(path.as_ref());
        state.unreadable.insert(path);
    }

    /// Paths of all files at or below `prefix`, in path order.
    pub fn files_under<P: AsRef<Path>>(&self, prefix: P) -> Vec<PathBuf> {
        let state = self.lock();
        let prefix = state.resolve(prefix.as_ref());
        state
            .nodes
            .iter()
            .filter(|(path, node)| {
                path.starts_with(&prefix) && matches!(node, MemoryNode::File { .. })
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn resolve(&self, path: &Path) -> PathBuf {
        normalize(&self.current_dir, path)
    }

    fn create_dirs(&mut self, path: &Path, at: DateTime<Utc>) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.nodes
                .entry(ancestor.to_path_buf())
                .or_insert(MemoryNode::Directory {
                    created_at: at,
                    modified_at: at,
                });
        }
    }

    fn is_directory(&self, path: &Path) -> bool {
        matches!(self.nodes.get(path), Some(MemoryNode::Directory { .. }))
    }

    fn entry(&self, path: &Path, node: &MemoryNode) -> FsEntry {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match node {
            MemoryNode::Directory {
                created_at,
                modified_at,
            } => FsEntry {
                name,
                path: path.to_path_buf(),
                is_directory: true,
                size: None,
                created_at: Some(*created_at),
                modified_at: Some(*modified_at),
            },
            MemoryNode::File {
                data,
                created_at,
                modified_at,
            } => FsEntry {
                name,
                path: path.to_path_buf(),
                is_directory: false,
                size: Some(lock_bytes(data).len() as u64),
                created_at: Some(*created_at),
                modified_at: Some(*modified_at),
            },
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn current_directory(&self) -> Result<PathBuf> {
        Ok(self.lock().current_dir.clone())
    }

    fn directory_exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.is_directory(&state.resolve(path))
    }

    fn file_exists(&self, path: &Path) -> bool {
        let state = self.lock();
        matches!(
            state.nodes.get(&state.resolve(path)),
            Some(MemoryNode::File { .. })
        )
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let path = state.resolve(path);
        if let Some(MemoryNode::File { .. }) = state.nodes.get(&path) {
            return Err(io_error(ErrorKind::AlreadyExists, &path));
        }
        state.create_dirs(&path, Utc::now());
        Ok(())
    }

    fn enumerate_entries(&self, path: &Path, pattern: &str) -> Result<Vec<FsEntry>> {
        let pattern = NamePattern::new(pattern)?;
        let state = self.lock();
        let dir = state.resolve(path);
        if !state.is_directory(&dir) {
            return Err(io_error(ErrorKind::NotFound, &dir));
        }
        if state.unreadable.contains(&dir) {
            return Err(io_error(ErrorKind::PermissionDenied, &dir));
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(dir.as_path()))
            .map(|(child, node)| state.entry(child, node))
            .filter(|entry| entry.is_directory || pattern.matches(&entry.name))
            .collect())
    }

    fn stat(&self, path: &Path) -> Result<FsEntry> {
        let state = self.lock();
        let path = state.resolve(path);
        let node = state
            .nodes
            .get(&path)
            .ok_or_else(|| io_error(ErrorKind::NotFound, &path))?;
        Ok(state.entry(&path, node))
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn Read>> {
        let state = self.lock();
        let path = state.resolve(path);
        if state.unreadable.contains(&path) {
            return Err(io_error(ErrorKind::PermissionDenied, &path));
        }
        match state.nodes.get(&path) {
            Some(MemoryNode::File { data, .. }) => {
                Ok(Box::new(Cursor::new(lock_bytes(data).clone())))
            }
            _ => Err(io_error(ErrorKind::NotFound, &path)),
        }
    }

    fn create_for_write(&self, path: &Path) -> Result<Box<dyn Write>> {
        let mut state = self.lock();
        let path = state.resolve(path);
        if state.nodes.contains_key(&path) {
            return Err(io_error(ErrorKind::AlreadyExists, &path));
        }
        let parent_exists = path.parent().is_some_and(|parent| state.is_directory(parent));
        if !parent_exists {
            return Err(io_error(ErrorKind::NotFound, &path));
        }

        let data: SharedBytes = Arc::default();
        let now = Utc::now();
        state.nodes.insert(
            path,
            MemoryNode::File {
                data: Arc::clone(&data),
                created_at: now,
                modified_at: now,
            },
        );
        Ok(Box::new(MemoryWriter { data }))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        let from = state.resolve(from);
        let to = state.resolve(to);
        if state.is_directory(&to) {
            return Err(io_error(ErrorKind::AlreadyExists, &to));
        }
        let parent_exists = to.parent().is_some_and(|parent| state.is_directory(parent));
        if !parent_exists {
            return Err(io_error(ErrorKind::NotFound, &to));
        }
        let node = match state.nodes.remove(&from) {
            Some(node @ MemoryNode::File { .. }) => node,
            Some(other) => {
                state.nodes.insert(from.clone(), other);
                return Err(io_error(ErrorKind::InvalidInput, &from));
            }
            None => return Err(io_error(ErrorKind::NotFound, &from)),
        };
        state.nodes.insert(to, node);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let path = state.resolve(path);
        match state.nodes.get(&path) {
            Some(MemoryNode::File { .. }) => {
                state.nodes.remove(&path);
                Ok(())
            }
            _ => Err(io_error(ErrorKind::NotFound, &path)),
        }
    }
}

struct MemoryWriter {
    data: SharedBytes,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_bytes(&self.data).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lock_bytes(data: &SharedBytes) -> MutexGuard<'_, Vec<u8>> {
    data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn io_error(kind: ErrorKind, path: &Path) -> Error {
    Error::Io(io::Error::new(kind, path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let fs = MemoryFileSystem::default();
        fs.create_directory(Path::new("out")).unwrap();

        let mut writer = fs.create_for_write(Path::new("out/a.txt")).unwrap();
        writer.write_all(b"Hello").unwrap();
        drop(writer);

        assert_eq!(fs.read_file_string("/work/out/a.txt").unwrap(), "Hello");
        assert!(fs.file_exists(Path::new("out/a.txt")));
        assert!(fs.create_for_write(Path::new("out/a.txt")).is_err());
    }

    #[test]
    fn test_enumerate_filters_files_only() {
        let fs = MemoryFileSystem::default();
        fs.set_file("src/1.txt", "one");
        fs.set_file("src/2.zip", "two");
        fs.add_directory("src/nested");

        let names: Vec<_> = fs
            .enumerate_entries(Path::new("src"), "*.txt")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["1.txt", "nested"]);
    }

    #[test]
    fn test_rename_replaces_target() {
        let fs = MemoryFileSystem::default();
        fs.set_file("a", "new");
        fs.set_file("b", "old");

        fs.rename(Path::new("a"), Path::new("b")).unwrap();

        assert!(!fs.file_exists(Path::new("a")));
        assert_eq!(fs.read_file_string("b").unwrap(), "new");
    }

    #[test]
    fn test_unreadable_file() {
        let fs = MemoryFileSystem::default();
        fs.set_file("locked.bin", "secret");
        fs.make_unreadable("locked.bin");

        assert!(fs.open_for_read(Path::new("locked.bin")).is_err());
        assert!(fs.stat(Path::new("locked.bin")).is_ok());
    }
}
