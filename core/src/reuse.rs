//! Incremental hash reuse against the previous snapshot.
//!
//! A file whose relative path, size and modification time all match a
//! record of the previous manifest keeps that record's digest and is not
//! read again. Times are compared at manifest precision (100 ns).

use crate::digest::{Digest, DigestAlgorithm};
use crate::manifest::{truncate_to_ticks, SnapshotRecord};
use crate::tree::FileNode;
use crate::walker::walk;
use std::collections::HashMap;
use tracing::debug;

/// Why a file has to be hashed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashReason {
    NoRecord,
    SizeChanged,
    TimeChanged,
    /// The record's digest does not decode for the requested algorithm.
    UnusableDigest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReuseDecision {
    Reuse(Digest),
    Compute(RehashReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReuseStats {
    pub reused: usize,
    pub no_record: usize,
    pub changed: usize,
}

impl ReuseStats {
    pub fn to_compute(&self) -> usize {
        self.no_record + self.changed
    }
}

/// Previous records keyed by relative path.
#[derive(Debug)]
pub struct HashReuse {
    algorithm: DigestAlgorithm,
    records: HashMap<String, SnapshotRecord>,
}

impl HashReuse {
    pub fn new<I>(algorithm: DigestAlgorithm, records: I) -> Self
    where
        I: IntoIterator<Item = SnapshotRecord>,
    {
        let records = records
            .into_iter()
            .map(|record| (record.relative_path.clone(), record))
            .collect();
        Self { algorithm, records }
    }

    /// No previous snapshot: every file is hashed.
    pub fn empty(algorithm: DigestAlgorithm) -> Self {
        Self::new(algorithm, std::iter::empty())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn decide(&self, node: &FileNode) -> ReuseDecision {
        let Some(record) = self.records.get(&node.relative_path) else {
            return ReuseDecision::Compute(RehashReason::NoRecord);
        };
        if node.size != Some(record.size) {
            return ReuseDecision::Compute(RehashReason::SizeChanged);
        }
        if node.modified_at.map(truncate_to_ticks) != Some(record.modified_at) {
            return ReuseDecision::Compute(RehashReason::TimeChanged);
        }
        match Digest::from_hex(self.algorithm, &record.digest) {
            Ok(digest) => ReuseDecision::Reuse(digest),
            Err(e) => {
                debug!("Cannot reuse digest for {}: {}", node.relative_path, e);
                ReuseDecision::Compute(RehashReason::UnusableDigest)
            }
        }
    }

    /// Sorts `tree` and attaches reusable digests to its file nodes.
    /// Archive entries are left alone.
    pub fn apply(&self, tree: &mut FileNode) -> ReuseStats {
        tree.sort();

        let mut stats = ReuseStats::default();
        walk(tree, |node| {
            if !node.is_file() {
                return;
            }
            match self.decide(node) {
                ReuseDecision::Reuse(digest) => {
                    node.set_digest(digest);
                    stats.reused += 1;
                }
                ReuseDecision::Compute(RehashReason::NoRecord) => stats.no_record += 1,
                ReuseDecision::Compute(_) => stats.changed += 1,
            }
        });

        debug!(
            "Hash reuse: {} reused, {} new, {} changed",
            stats.reused, stats.no_record, stats.changed
        );
        stats
    }
}
