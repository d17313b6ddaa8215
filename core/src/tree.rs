use crate::digest::{Digest, DigestAlgorithm};
use crate::events::Observer;
use crate::fs::{FileSystem, FsEntry, NamePattern};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    File,
    /// Synthetic entry enumerated from inside an archive file.
    ArchiveEntry,
}

/// A filesystem entry or archive member.
///
/// `relative_path` is the slash-separated path from the tree root and equals
/// the parent's path joined with `name`. Archive entries are the exception:
/// they hang flat under their archive file, so their `relative_path` joins
/// the archive's path with the whole in-archive path. Only files and archive
/// entries carry digests; a file's children are the entries of the archive
/// it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub relative_path: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub digests: BTreeMap<DigestAlgorithm, Digest>,
    pub children: Vec<FileNode>,
}

impl FileNode {
    pub fn directory(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Directory, name.into(), relative_path.into())
    }

    pub fn file(
        name: impl Into<String>,
        relative_path: impl Into<String>,
        size: u64,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let mut node = Self::with_kind(NodeKind::File, name.into(), relative_path.into());
        node.size = Some(size);
        node.modified_at = Some(modified_at);
        node
    }

    pub fn archive_entry(
        name: impl Into<String>,
        relative_path: impl Into<String>,
        size: Option<u64>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut node = Self::with_kind(NodeKind::ArchiveEntry, name.into(), relative_path.into());
        node.size = size;
        node.modified_at = modified_at;
        node
    }

    /// Builds a node from filesystem metadata.
    pub fn from_entry(entry: &FsEntry, relative_path: impl Into<String>) -> Self {
        let kind = if entry.is_directory {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        let mut node = Self::with_kind(kind, entry.name.clone(), relative_path.into());
        node.size = if entry.is_directory { None } else { entry.size };
        node.created_at = entry.created_at;
        node.modified_at = entry.modified_at;
        node
    }

    fn with_kind(kind: NodeKind, name: String, relative_path: String) -> Self {
        Self {
            name,
            relative_path,
            kind,
            size: None,
            created_at: None,
            modified_at: None,
            digests: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File)
    }

    pub fn is_archive_entry(&self) -> bool {
        matches!(self.kind, NodeKind::ArchiveEntry)
    }

    /// Relative path a child called `name` would have.
    pub fn child_path(&self, name: &str) -> String {
        if self.relative_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.relative_path, name)
        }
    }

    pub fn add_child(&mut self, child: FileNode) {
        self.children.push(child);
    }

    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&Digest> {
        self.digests.get(&algorithm)
    }

    /// Stores `digest` under its algorithm. Directories never hold digests,
    /// so the call is refused for them and `false` is returned.
    pub fn set_digest(&mut self, digest: Digest) -> bool {
        if self.is_directory() {
            return false;
        }
        self.digests.insert(digest.algorithm(), digest);
        true
    }

    /// Orders every child list in the subtree by name (ordinal).
    pub fn sort(&mut self) {
        let mut stack: Vec<&mut FileNode> = vec![self];
        while let Some(node) = stack.pop() {
            node.children.sort_by(|a, b| a.name.cmp(&b.name));
            stack.extend(node.children.iter_mut());
        }
    }

    /// Resolves a slash-separated path relative to this node. Below an
    /// archive file the rest of the path is matched as one in-archive path.
    pub fn find(&self, relative_path: &str) -> Option<&FileNode> {
        let segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;
        for (i, segment) in segments.iter().enumerate() {
            if node.children.iter().any(FileNode::is_archive_entry) {
                let wanted = node.child_path(&segments[i..].join("/"));
                return node.children.iter().find(|child| child.relative_path == wanted);
            }
            node = node.children.iter().find(|child| child.name == *segment)?;
        }
        Some(node)
    }

    /// Pre-order iterator over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn file_count(&self) -> usize {
        self.descendants().filter(|node| node.is_file()).count()
    }

    pub fn directory_count(&self) -> usize {
        self.descendants().filter(|node| node.is_directory()).count()
    }

    pub fn total_size(&self) -> u64 {
        self.descendants()
            .filter(|node| node.is_file())
            .filter_map(|node| node.size)
            .sum()
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a FileNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a FileNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Reads the directory tree under `root` through the filesystem seam.
///
/// Files are filtered by `search_pattern`; every directory is descended.
/// Children keep the order the filesystem reports them in.
///
/// A subdirectory that cannot be listed is reported to `observer` and kept
/// as an empty node. The second value counts those directories. Failing to
/// list `root` itself is an error.
pub fn read_tree(
    fs: &dyn FileSystem,
    root: &Path,
    search_pattern: &str,
    observer: &dyn Observer,
) -> Result<(FileNode, usize)> {
    // Validate the pattern before touching the filesystem.
    NamePattern::new(search_pattern)?;

    let root_entry = fs.stat(root)?;
    let mut root_node = FileNode::from_entry(&root_entry, "");
    if !root_node.is_directory() {
        return Err(crate::Error::Other(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    observer.directory_found(root);

    // Each frame: (index path from root to the directory node, its fs path).
    let mut stack: Vec<(Vec<usize>, PathBuf)> = vec![(Vec::new(), root.to_path_buf())];
    let mut unlisted = 0;

    while let Some((index_path, dir_path)) = stack.pop() {
        let entries = match fs.enumerate_entries(&dir_path, search_pattern) {
            Ok(entries) => entries,
            Err(e) if !index_path.is_empty() => {
                let item = node_at_mut(&mut root_node, &index_path).relative_path.clone();
                observer.item_failed(&item, &e);
                unlisted += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        let dir_node = node_at_mut(&mut root_node, &index_path);
        let mut subdirectories = Vec::new();

        for entry in entries {
            let child = FileNode::from_entry(&entry, dir_node.child_path(&entry.name));
            if child.is_directory() {
                observer.directory_found(&entry.path);
                subdirectories.push((dir_node.children.len(), entry.path.clone()));
            } else {
                observer.file_found(&entry.path);
            }
            dir_node.add_child(child);
        }

        for (child_index, child_path) in subdirectories.into_iter().rev() {
            let mut child_indices = index_path.clone();
            child_indices.push(child_index);
            stack.push((child_indices, child_path));
        }
    }

    Ok((root_node, unlisted))
}

pub(crate) fn node_at_mut<'a>(root: &'a mut FileNode, index_path: &[usize]) -> &'a mut FileNode {
    index_path
        .iter()
        .fold(root, |node, &index| &mut node.children[index])
}
