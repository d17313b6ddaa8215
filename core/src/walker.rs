//! Depth-first, pre-order traversal over a [`FileNode`] tree.
//!
//! The walk is driven by an explicit stack rather than recursion. The
//! visitor receives each node mutably; children it appends (for example the
//! entries of an archive) are walked right after it.

use crate::tree::{node_at_mut, FileNode};

/// Visits `root` and every descendant, parents before children, siblings in
/// discovery order.
pub fn walk<F>(root: &mut FileNode, mut visit: F)
where
    F: FnMut(&mut FileNode),
{
    walk_with_depth(root, |node, _depth| visit(node));
}

/// Like [`walk`], also passing the depth of each node (root is 0).
pub fn walk_with_depth<F>(root: &mut FileNode, mut visit: F)
where
    F: FnMut(&mut FileNode, usize),
{
    let mut stack: Vec<Vec<usize>> = vec![Vec::new()];

    while let Some(index_path) = stack.pop() {
        let node = node_at_mut(root, &index_path);
        visit(node, index_path.len());

        // Read the child count after visiting: the visitor may have added some.
        for child_index in (0..node.children.len()).rev() {
            let mut child_path = index_path.clone();
            child_path.push(child_index);
            stack.push(child_path);
        }
    }
}
