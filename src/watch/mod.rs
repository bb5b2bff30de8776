//! Directory watching for continuous crawls
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ register(dir)  ┌──────────────────┐  OS events  ┌───────────┐
//! │   Workers    │ ─────────────▶ │  NotifyWatcher   │ ◀────────── │  notify   │
//! │ (first visit)│                │  registrations   │             │  backend  │
//! └──────▲───────┘                └────────┬─────────┘             └───────────┘
//!        │                                 │ WatchEvent (crossbeam)
//!        │ take()                          ▼
//! ┌──────┴───────┐    submit()    ┌──────────────────┐
//! │  Work Queue  │ ◀───────────── │    WatchPump     │
//! └──────────────┘                │ (own thread)     │
//!                                 └──────────────────┘
//! ```
//!
//! The pump is an ordinary producer: it does not take part in termination
//! detection, so a watched crawl runs until it is stopped.

mod notify_watcher;
mod pump;

pub use notify_watcher::NotifyWatcher;
pub use pump::{PumpStats, WatchPump};

use crate::error::WatchError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Kind of change reported for a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// A change to one entry of a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Watched directory containing the entry
    pub directory: PathBuf,

    /// What happened
    pub kind: WatchEventKind,

    /// Name of the entry within `directory`
    pub child: OsString,
}

impl WatchEvent {
    /// Create an event
    pub fn new(directory: impl Into<PathBuf>, kind: WatchEventKind, child: impl Into<OsString>) -> Self {
        Self {
            directory: directory.into(),
            kind,
            child: child.into(),
        }
    }

    /// Split a full path into an event, if it has a parent and a name
    pub fn from_path(path: &Path, kind: WatchEventKind) -> Option<Self> {
        let directory = path.parent()?;
        let child = path.file_name()?;
        Some(Self::new(directory, kind, child))
    }

    /// Full path of the affected entry
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.child)
    }
}

/// Registration side of a directory watcher
///
/// Implementations must be idempotent: registering a directory twice has no
/// effect beyond the first call, until the directory is unregistered.
pub trait DirectoryWatcher: Send + Sync {
    /// Start watching `dir`
    ///
    /// Returns `Ok(true)` on the first registration, `Ok(false)` if it was
    /// already registered.
    fn register(&self, dir: &Path) -> Result<bool, WatchError>;

    /// Stop watching `dir` and every registered directory below it
    ///
    /// Called when `dir` is deleted, so a directory re-created at the same
    /// path registers afresh. Returns how many registrations were dropped.
    fn unregister(&self, dir: &Path) -> usize;

    /// Whether `dir` is registered
    fn is_registered(&self, dir: &Path) -> bool;

    /// Number of registered directories
    fn registered_count(&self) -> usize;
}
