//! Worker thread logic for the parallel crawl
//!
//! Each worker:
//! - Takes paths from the work queue through its detector slot
//! - Hands regular files to the sink
//! - Enumerates directories, claims each child in the path cache, and
//!   submits it to the queue, or visits it inline when the queue is full
//! - Registers directories with the watcher on first visit (watch mode)

use crate::config::CrawlConfig;
use crate::error::{VisitOutcome, WorkerError};
use crate::sink::FileSink;
use crate::walker::cache::PathCache;
use crate::walker::queue::{TrySubmit, WorkItem, WorkQueueSender};
use crate::walker::quiescence::ActiveSlot;
use crate::watch::DirectoryWatcher;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Stack size of worker threads
///
/// Inline visits recurse once per directory level while the queue stays
/// full, keeping one open directory handle per level. PATH_MAX bounds that
/// depth to about 2048 levels, which fits here at a few KiB of frames per
/// level. Running out of descriptors first makes `read_dir` fail, and that
/// level is skipped like any unreadable directory.
pub const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Statistics shared by all workers of a crawl
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Directories enumerated
    pub dirs_processed: AtomicU64,

    /// Files handed to the sink
    pub files_emitted: AtomicU64,

    /// Bytes of emitted files
    pub bytes_found: AtomicU64,

    /// Paths skipped (missing, unreadable, symlink, ...)
    pub skipped: AtomicU64,

    /// Sink failures and unreadable directory entries
    pub errors: AtomicU64,

    /// Children visited inline because the queue was full
    pub inline_visits: AtomicU64,
}

impl WorkerStats {
    fn record_dir(&self) {
        self.dirs_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_file(&self, bytes: u64) {
        self.files_emitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_found.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_inline(&self) {
        self.inline_visits.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything a worker shares with the rest of the crawl
#[derive(Clone)]
pub struct WorkerContext {
    /// Configuration
    pub config: Arc<CrawlConfig>,

    /// Dedup cache
    pub cache: Arc<PathCache>,

    /// Producer side of the work queue
    pub queue: WorkQueueSender,

    /// Downstream receiver of files
    pub sink: Arc<dyn FileSink>,

    /// Watcher to register directories with (watch mode)
    pub watcher: Option<Arc<dyn DirectoryWatcher>>,

    /// Shared counters
    pub stats: Arc<WorkerStats>,
}

/// A worker thread that visits queued paths
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a new worker thread owning `slot`
    pub fn spawn(id: usize, ctx: WorkerContext, slot: ActiveSlot) -> Result<Self, WorkerError> {
        let handle = thread::Builder::new()
            .name(format!("walker-{}", id))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || worker_loop(id, ctx, slot))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|panic| WorkerError::Panicked {
                id: self.id,
                message: panic_message(panic.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Main worker loop
fn worker_loop(id: usize, ctx: WorkerContext, mut slot: ActiveSlot) {
    debug!(worker = id, "Worker starting");

    let mut visited = 0u64;
    while let Some(item) = slot.take() {
        let outcome = visit_path(id, item.path(), &ctx);
        log_outcome(id, &outcome);
        visited += 1;
    }

    debug!(worker = id, visited = visited, "Worker shutting down");
}

fn log_outcome(worker_id: usize, outcome: &VisitOutcome) {
    match outcome {
        VisitOutcome::Emitted { path } => {
            trace!(worker = worker_id, path = %path.display(), "File emitted");
        }
        VisitOutcome::Expanded {
            path,
            children,
            queued,
            inline,
        } => {
            trace!(
                worker = worker_id,
                path = %path.display(),
                children = children,
                queued = queued,
                inline = inline,
                "Directory expanded"
            );
        }
        VisitOutcome::Skipped { path, reason } => {
            debug!(worker = worker_id, path = %path.display(), reason = %reason, "Path skipped");
        }
        VisitOutcome::Failed { path, error } => {
            warn!(worker = worker_id, path = %path.display(), error = %error, "Sink failed");
        }
    }
}

/// Key under which `path` is claimed in the cache
///
/// With `follow_symlinks` the canonical path is used, so every alias of a
/// target shares one claim and symlink cycles terminate. Returns `None` if
/// the path cannot be canonicalized (dangling link, vanished entry).
pub fn claim_key(path: &Path, follow_symlinks: bool) -> Option<PathBuf> {
    if follow_symlinks {
        fs::canonicalize(path).ok()
    } else {
        Some(path.to_path_buf())
    }
}

/// Visit a single claimed path
pub fn visit_path(worker_id: usize, path: &Path, ctx: &WorkerContext) -> VisitOutcome {
    let metadata = if ctx.config.follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };

    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) => {
            ctx.stats.record_skip();
            return VisitOutcome::Skipped {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
        }
    };

    let file_type = metadata.file_type();

    if file_type.is_file() {
        return match ctx.sink.emit(path) {
            Ok(()) => {
                ctx.stats.record_file(metadata.len());
                VisitOutcome::Emitted {
                    path: path.to_path_buf(),
                }
            }
            Err(error) => {
                ctx.stats.record_error();
                VisitOutcome::Failed {
                    path: path.to_path_buf(),
                    error,
                }
            }
        };
    }

    if file_type.is_dir() {
        return expand_directory(worker_id, path, ctx);
    }

    ctx.stats.record_skip();
    let reason = if file_type.is_symlink() {
        "Symlink not followed"
    } else {
        "Not a regular file or directory"
    };
    VisitOutcome::Skipped {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Enumerate a directory and distribute its unclaimed children
fn expand_directory(worker_id: usize, path: &Path, ctx: &WorkerContext) -> VisitOutcome {
    if let Some(watcher) = &ctx.watcher {
        // A directory that cannot be watched is still crawled
        if let Err(e) = watcher.register(path) {
            warn!(worker = worker_id, error = %e, "Watch registration failed");
        }
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            ctx.stats.record_skip();
            return VisitOutcome::Skipped {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
        }
    };

    ctx.stats.record_dir();

    let mut children = 0;
    let mut queued = 0;
    let mut inline = 0;

    for entry in entries {
        let child = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                ctx.stats.record_error();
                debug!(worker = worker_id, path = %path.display(), error = %e, "Unreadable directory entry");
                continue;
            }
        };

        children += 1;

        if ctx.config.is_excluded(&child) {
            trace!(worker = worker_id, path = %child.display(), "Excluded");
            continue;
        }

        let Some(key) = claim_key(&child, ctx.config.follow_symlinks) else {
            ctx.stats.record_skip();
            debug!(worker = worker_id, path = %child.display(), "Cannot resolve path");
            continue;
        };

        if !ctx.cache.try_claim(&key) {
            trace!(worker = worker_id, path = %key.display(), "Already claimed");
            continue;
        }

        match ctx.queue.try_submit(WorkItem::new(key)) {
            Ok(TrySubmit::Queued) => queued += 1,
            Ok(TrySubmit::Full(item)) => {
                // Backpressure - visit on this worker instead of blocking
                ctx.queue.record_inline();
                ctx.stats.record_inline();
                inline += 1;
                trace!(worker = worker_id, path = %item.path().display(), "Queue full - visiting inline");

                let outcome = visit_path(worker_id, item.path(), ctx);
                log_outcome(worker_id, &outcome);
            }
            Err(e) => {
                ctx.stats.record_error();
                error!(worker = worker_id, error = %e, "Failed to submit child");
            }
        }
    }

    VisitOutcome::Expanded {
        path: path.to_path_buf(),
        children,
        queued,
        inline,
    }
}

/// Log a one-line summary of shared statistics
pub fn log_stats(stats: &WorkerStats) {
    info!(
        dirs = stats.dirs_processed.load(Ordering::Relaxed),
        files = stats.files_emitted.load(Ordering::Relaxed),
        skipped = stats.skipped.load(Ordering::Relaxed),
        errors = stats.errors.load(Ordering::Relaxed),
        inline = stats.inline_visits.load(Ordering::Relaxed),
        "Worker totals"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkResult;
    use crate::walker::queue::WorkQueue;
    use parking_lot::Mutex;

    fn context(queue: &WorkQueue, seen: Arc<Mutex<Vec<PathBuf>>>) -> WorkerContext {
        let sink = move |path: &Path| -> SinkResult<()> {
            seen.lock().push(path.to_path_buf());
            Ok(())
        };
        WorkerContext {
            config: Arc::new(CrawlConfig::new("/").with_exclude(r"ignored").unwrap()),
            cache: Arc::new(PathCache::new()),
            queue: queue.sender(),
            sink: Arc::new(sink),
            watcher: None,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();

        stats.record_dir();
        stats.record_file(1024);
        stats.record_error();
        stats.record_skip();
        stats.record_inline();

        assert_eq!(stats.dirs_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.files_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_found.load(Ordering::Relaxed), 1024);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.skipped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.inline_visits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_visit_file_emits() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let queue = WorkQueue::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(&queue, Arc::clone(&seen));

        let outcome = visit_path(0, &file, &ctx);
        assert!(matches!(outcome, VisitOutcome::Emitted { .. }));
        assert_eq!(seen.lock().as_slice(), &[file]);
        assert_eq!(ctx.stats.bytes_found.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_visit_missing_is_skipped() {
        let queue = WorkQueue::new(4);
        let ctx = context(&queue, Arc::new(Mutex::new(Vec::new())));

        let outcome = visit_path(0, Path::new("/definitely/not/here"), &ctx);
        assert!(matches!(outcome, VisitOutcome::Skipped { .. }));
        assert_eq!(ctx.stats.skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_directory_children_queued_and_claimed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one"), b"1").unwrap();
        fs::write(dir.path().join("two"), b"2").unwrap();
        fs::write(dir.path().join("ignored"), b"3").unwrap();

        let queue = WorkQueue::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(&queue, Arc::clone(&seen));

        match visit_path(0, dir.path(), &ctx) {
            VisitOutcome::Expanded {
                children,
                queued,
                inline,
                ..
            } => {
                assert_eq!(children, 3);
                assert_eq!(queued, 2);
                assert_eq!(inline, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // Nothing emitted yet: children wait in the queue
        assert!(seen.lock().is_empty());
        assert_eq!(queue.len(), 2);
        assert!(ctx.cache.contains(&dir.path().join("one")));
        assert!(!ctx.cache.contains(&dir.path().join("ignored")));

        // A second expansion finds everything claimed
        match visit_path(0, dir.path(), &ctx) {
            VisitOutcome::Expanded { queued, inline, .. } => {
                assert_eq!(queued + inline, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_full_queue_visits_inline() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{}", i)), b"x").unwrap();
        }

        let queue = WorkQueue::new(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(&queue, Arc::clone(&seen));

        match visit_path(0, dir.path(), &ctx) {
            VisitOutcome::Expanded { queued, inline, .. } => {
                assert_eq!(queued, 2);
                assert_eq!(inline, 3);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(seen.lock().len(), 3);
        assert_eq!(queue.stats().inline_count(), 3);
        assert_eq!(ctx.cache.len(), 5);
    }

    #[test]
    fn test_deep_tree_inline_on_worker_stack() {
        // Every level holds a file and a subdirectory; with capacity 1 one of
        // them is always visited inline, so recursion follows the depth
        let dir = tempfile::tempdir().unwrap();
        let mut level = dir.path().to_path_buf();
        for _ in 0..400 {
            fs::write(level.join("f"), b"x").unwrap();
            fs::write(level.join("g"), b"x").unwrap();
            level.push("d");
            fs::create_dir(&level).unwrap();
        }

        let queue = WorkQueue::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(&queue, Arc::clone(&seen));
        let detector = queue.detector();
        queue.seed(dir.path()).unwrap();

        let worker = Worker::spawn(0, ctx.clone(), detector.register()).unwrap();
        worker.join().unwrap();

        assert!(detector.is_quiesced());
        assert_eq!(seen.lock().len(), 800);
        assert!(ctx.stats.inline_visits.load(Ordering::Relaxed) > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_not_followed_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let queue = WorkQueue::new(4);
        let ctx = context(&queue, Arc::new(Mutex::new(Vec::new())));

        let outcome = visit_path(0, &link, &ctx);
        assert!(matches!(outcome, VisitOutcome::Skipped { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_claim_key_canonicalizes_when_following() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("alias");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let canonical = fs::canonicalize(&target).unwrap();
        assert_eq!(claim_key(&link, true), Some(canonical.clone()));
        assert_eq!(claim_key(&target, true), Some(canonical));
        assert_eq!(claim_key(&link, false), Some(link.clone()));
        assert_eq!(claim_key(&dir.path().join("dangling"), true), None);
    }
}
