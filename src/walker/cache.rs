//! Deduplication cache for claimed paths
//!
//! Every path is claimed at most once per crawl. The claim is a single
//! insert on a sharded concurrent set, so concurrent attempts on the same
//! path (two siblings resolving to one symlink target, a watch event racing
//! the sweep) produce exactly one winner.
//!
//! Claims are released only per subtree, when the watcher reports a
//! deletion.

use dashmap::DashSet;
use std::path::{Path, PathBuf};

/// Set of paths already claimed for processing
#[derive(Debug, Default)]
pub struct PathCache {
    claimed: DashSet<PathBuf>,
}

impl PathCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path for processing
    ///
    /// Returns `true` if the caller is the first to claim `path` and may
    /// proceed, `false` if it was already claimed and must be skipped.
    pub fn try_claim(&self, path: &Path) -> bool {
        // DashSet::insert holds the shard lock for the check and the insert
        self.claimed.insert(path.to_path_buf())
    }

    /// Drop the claims on `root` and everything below it
    ///
    /// Returns how many claims were released. Only the watch re-entry path
    /// uses this, so a deleted directory that reappears is crawled again
    /// down to its leaves; traversal itself never releases.
    pub fn forget_tree(&self, root: &Path) -> usize {
        let mut released = 0;
        self.claimed.retain(|claimed| {
            let keep = !claimed.starts_with(root);
            if !keep {
                released += 1;
            }
            keep
        });
        released
    }

    /// Check whether a path has been claimed
    pub fn contains(&self, path: &Path) -> bool {
        self.claimed.contains(path)
    }

    /// Number of claimed paths
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// Check if nothing has been claimed yet
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
