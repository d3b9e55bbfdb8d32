//! Process-lifetime memory of which upload paths were already attempted.
//!
//! The scheduler rescans the same directories every few seconds. Without a
//! record of what it has tried, a file that failed placement (or an archive
//! that was rejected) would be retried on every pass. A [`RetryCache`] holds
//! canonical paths for the duration of one process run and is never written
//! to disk: a restart forgets everything, so every stage downstream must be
//! safe to repeat (a re-run either no-ops or reports a collision).
//!
//! Paths are canonicalized before lookup so that `./alice/../alice/x.jpg`
//! and a symlink to it share one slot.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Attempted and blacklisted canonical paths.
#[derive(Debug, Default)]
pub struct RetryCache {
    tried: HashSet<PathBuf>,
    blacklisted: HashSet<PathBuf>,
}

impl RetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `path` is offered, false afterwards.
    pub fn try_once(&mut self, path: &Path) -> bool {
        let path = canonicalize(path);
        if self.blacklisted.contains(&path) {
            return false;
        }
        self.tried.insert(path)
    }

    /// Same answer as [`try_once`](Self::try_once) without recording anything.
    ///
    /// Used for user directories, which are rescanned for new files every
    /// iteration even though the directory itself is not new.
    pub fn check_only(&self, path: &Path) -> bool {
        let path = canonicalize(path);
        !self.blacklisted.contains(&path) && !self.tried.contains(&path)
    }

    /// Reject `path` for the rest of the run.
    pub fn blacklist(&mut self, path: &Path) {
        let path = canonicalize(path);
        self.tried.remove(&path);
        self.blacklisted.insert(path);
    }

    pub fn is_blacklisted(&self, path: &Path) -> bool {
        self.blacklisted.contains(&canonicalize(path))
    }

    /// Number of attempted paths (blacklist excluded).
    pub fn len(&self) -> usize {
        self.tried.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tried.is_empty()
    }
}

/// Resolve symlinks and relative components.
///
/// Falls back to the path as given when it no longer exists, which happens
/// for uploads deleted between discovery and lookup.
pub fn canonicalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
