//! Re-injection of watch events into the work queue

use super::{DirectoryWatcher, WatchEvent, WatchEventKind};
use crate::config::CrawlConfig;
use crate::error::WatchError;
use crate::walker::cache::PathCache;
use crate::walker::queue::{TrySubmit, WorkItem, WorkQueueSender};
use crate::walker::worker::claim_key;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How often the pump re-checks the shutdown flag while idle or blocked
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters kept by the pump
#[derive(Debug, Default)]
pub struct PumpStats {
    /// Events received from the watcher
    pub events: AtomicU64,

    /// Paths submitted to the queue
    pub submitted: AtomicU64,

    /// Claims released because of deletions
    pub released: AtomicU64,
}

/// Thread feeding watcher events back into the work queue
pub struct WatchPump {
    handle: Option<JoinHandle<()>>,
    stats: Arc<PumpStats>,
}

impl WatchPump {
    /// Start the pump on its own thread
    pub fn spawn(
        events: Receiver<WatchEvent>,
        queue: WorkQueueSender,
        cache: Arc<PathCache>,
        watcher: Arc<dyn DirectoryWatcher>,
        config: Arc<CrawlConfig>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WatchError> {
        let stats = Arc::new(PumpStats::default());
        let targets = PumpTargets {
            queue,
            cache,
            watcher,
            config,
            stats: Arc::clone(&stats),
        };

        let handle = thread::Builder::new()
            .name("watch-pump".to_string())
            .spawn(move || pump_loop(events, targets, shutdown))
            .map_err(|e| WatchError::PumpFailed(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    /// Wait for the pump to exit (after shutdown is signalled) and return
    /// its final counters
    pub fn join(mut self) -> Arc<PumpStats> {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Watch pump panicked");
            }
        }
        self.stats
    }
}

/// What the pump routes events into
struct PumpTargets {
    queue: WorkQueueSender,
    cache: Arc<PathCache>,
    watcher: Arc<dyn DirectoryWatcher>,
    config: Arc<CrawlConfig>,
    stats: Arc<PumpStats>,
}

fn pump_loop(events: Receiver<WatchEvent>, targets: PumpTargets, shutdown: Arc<AtomicBool>) {
    let stats = &targets.stats;

    info!("Watch pump starting");

    while !shutdown.load(Ordering::Relaxed) {
        let event = match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        stats.events.fetch_add(1, Ordering::Relaxed);

        let Some(item) = route_event(&event, &targets) else {
            continue;
        };

        if !submit_until_shutdown(&targets.queue, item, &shutdown) {
            break;
        }
        stats.submitted.fetch_add(1, Ordering::Relaxed);
    }

    info!(
        events = stats.events.load(Ordering::Relaxed),
        submitted = stats.submitted.load(Ordering::Relaxed),
        released = stats.released.load(Ordering::Relaxed),
        "Watch pump shutting down"
    );
}

/// Decide what to do with one event; returns the item to submit, if any
fn route_event(event: &WatchEvent, targets: &PumpTargets) -> Option<WorkItem> {
    let PumpTargets {
        cache,
        watcher,
        config,
        stats,
        ..
    } = targets;
    let path = event.path();

    if config.is_excluded(&path) {
        trace!(path = %path.display(), "Excluded watch event");
        return None;
    }

    match event.kind {
        WatchEventKind::Deleted => {
            // The entry is gone, so its canonical form cannot be resolved any more
            let key = claim_key(&path, config.follow_symlinks).unwrap_or(path);
            let released = cache.forget_tree(&key);
            let unwatched = watcher.unregister(&key);
            if released > 0 {
                stats.released.fetch_add(released as u64, Ordering::Relaxed);
                debug!(path = %key.display(), released, unwatched, "Deleted, claims dropped");
            }
            None
        }
        WatchEventKind::Created | WatchEventKind::Modified => {
            let key = claim_key(&path, config.follow_symlinks)?;
            let claimed = cache.try_claim(&key);
            let reprocess = !claimed
                && event.kind == WatchEventKind::Modified
                && config.reprocess_modified;

            if claimed || reprocess {
                debug!(path = %key.display(), kind = ?event.kind, reprocess, "Re-injecting");
                Some(WorkItem::new(key))
            } else {
                trace!(path = %key.display(), "Already claimed");
                None
            }
        }
    }
}

/// Blocking submit that gives up once shutdown is signalled
fn submit_until_shutdown(queue: &WorkQueueSender, mut item: WorkItem, shutdown: &AtomicBool) -> bool {
    loop {
        match queue.submit_timeout(item, POLL_INTERVAL) {
            Ok(TrySubmit::Queued) => return true,
            Ok(TrySubmit::Full(returned)) => {
                if shutdown.load(Ordering::Relaxed) {
                    return false;
                }
                item = returned;
            }
            Err(e) => {
                warn!(error = %e, "Watch pump cannot submit");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::queue::WorkQueue;
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct SetWatcher(Mutex<HashSet<PathBuf>>);

    impl DirectoryWatcher for SetWatcher {
        fn register(&self, dir: &Path) -> Result<bool, WatchError> {
            Ok(self.0.lock().insert(dir.to_path_buf()))
        }

        fn unregister(&self, dir: &Path) -> usize {
            let mut dirs = self.0.lock();
            let before = dirs.len();
            dirs.retain(|d| !d.starts_with(dir));
            before - dirs.len()
        }

        fn is_registered(&self, dir: &Path) -> bool {
            self.0.lock().contains(dir)
        }

        fn registered_count(&self) -> usize {
            self.0.lock().len()
        }
    }

    fn targets(queue: &WorkQueue, reprocess: bool) -> PumpTargets {
        let config = CrawlConfig::new("/w")
            .with_watch(true)
            .with_reprocess_modified(reprocess)
            .with_exclude(r"\.swp$")
            .unwrap();
        PumpTargets {
            queue: queue.sender(),
            cache: Arc::new(PathCache::new()),
            watcher: Arc::new(SetWatcher::default()),
            config: Arc::new(config),
            stats: Arc::new(PumpStats::default()),
        }
    }

    #[test]
    fn test_created_is_claimed_once() {
        let queue = WorkQueue::persistent(4);
        let targets = targets(&queue, false);
        let event = WatchEvent::new("/w", WatchEventKind::Created, "a.txt");

        let item = route_event(&event, &targets).unwrap();
        assert_eq!(item.path(), Path::new("/w/a.txt"));
        assert!(route_event(&event, &targets).is_none());
    }

    #[test]
    fn test_modified_reprocess_option() {
        let queue = WorkQueue::persistent(4);
        let event = WatchEvent::new("/w", WatchEventKind::Modified, "a.txt");

        let targets_off = targets(&queue, false);
        targets_off.cache.try_claim(Path::new("/w/a.txt"));
        assert!(route_event(&event, &targets_off).is_none());

        let targets_on = targets(&queue, true);
        targets_on.cache.try_claim(Path::new("/w/a.txt"));
        assert!(route_event(&event, &targets_on).is_some());
    }

    #[test]
    fn test_deleted_forgets_claim() {
        let queue = WorkQueue::persistent(4);
        let targets = targets(&queue, false);
        targets.cache.try_claim(Path::new("/w/a.txt"));

        let event = WatchEvent::new("/w", WatchEventKind::Deleted, "a.txt");
        assert!(route_event(&event, &targets).is_none());
        assert!(!targets.cache.contains(Path::new("/w/a.txt")));
        assert_eq!(targets.stats.released.load(Ordering::Relaxed), 1);

        // Re-creation is crawled again
        let event = WatchEvent::new("/w", WatchEventKind::Created, "a.txt");
        assert!(route_event(&event, &targets).is_some());
    }

    #[test]
    fn test_deleted_directory_releases_subtree_and_watches() {
        let queue = WorkQueue::persistent(4);
        let targets = targets(&queue, false);
        for path in ["/w/sub", "/w/sub/a.txt", "/w/sub/deep", "/w/sub/deep/b.txt", "/w/keep.txt"] {
            targets.cache.try_claim(Path::new(path));
        }
        targets.watcher.register(Path::new("/w")).unwrap();
        targets.watcher.register(Path::new("/w/sub")).unwrap();
        targets.watcher.register(Path::new("/w/sub/deep")).unwrap();

        let event = WatchEvent::new("/w", WatchEventKind::Deleted, "sub");
        assert!(route_event(&event, &targets).is_none());

        assert_eq!(targets.stats.released.load(Ordering::Relaxed), 4);
        assert_eq!(targets.cache.len(), 1);
        assert!(targets.cache.contains(Path::new("/w/keep.txt")));
        assert_eq!(targets.watcher.registered_count(), 1);
        assert!(targets.watcher.is_registered(Path::new("/w")));
    }

    #[test]
    fn test_excluded_event_ignored() {
        let queue = WorkQueue::persistent(4);
        let targets = targets(&queue, false);
        let event = WatchEvent::new("/w", WatchEventKind::Created, "a.txt.swp");
        assert!(route_event(&event, &targets).is_none());
        assert!(targets.cache.is_empty());
    }

    fn spawn_pump(
        queue: &WorkQueue,
        rx: Receiver<WatchEvent>,
        shutdown: &Arc<AtomicBool>,
    ) -> WatchPump {
        let PumpTargets {
            queue: sender,
            cache,
            watcher,
            config,
            ..
        } = targets(queue, false);
        WatchPump::spawn(rx, sender, cache, watcher, config, Arc::clone(shutdown)).unwrap()
    }

    #[test]
    fn test_pump_submits_and_stops() {
        let queue = WorkQueue::persistent(4);
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump = spawn_pump(&queue, rx, &shutdown);

        tx.send(WatchEvent::new("/w", WatchEventKind::Created, "x")).unwrap();
        tx.send(WatchEvent::new("/w", WatchEventKind::Created, "x")).unwrap();
        tx.send(WatchEvent::new("/w", WatchEventKind::Created, "y")).unwrap();

        let receiver = queue.receiver();
        let mut got: Vec<PathBuf> = (0..2)
            .map(|_| {
                receiver
                    .take_timeout(Duration::from_secs(5))
                    .unwrap()
                    .into_path()
            })
            .collect();
        got.sort();
        assert_eq!(got, vec![PathBuf::from("/w/x"), PathBuf::from("/w/y")]);

        shutdown.store(true, Ordering::SeqCst);
        let stats = pump.join();
        assert!(queue.is_empty());
        assert_eq!(stats.events.load(Ordering::Relaxed), 3);
        assert_eq!(stats.submitted.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_pump_gives_up_on_full_queue_at_shutdown() {
        let queue = WorkQueue::persistent(1);
        queue.seed("/w/occupied").unwrap();
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump = spawn_pump(&queue, rx, &shutdown);

        tx.send(WatchEvent::new("/w", WatchEventKind::Created, "blocked")).unwrap();
        thread::sleep(Duration::from_millis(200));

        shutdown.store(true, Ordering::SeqCst);
        let stats = pump.join();
        assert_eq!(queue.len(), 1);
        assert_eq!(stats.submitted.load(Ordering::Relaxed), 0);
    }
}
