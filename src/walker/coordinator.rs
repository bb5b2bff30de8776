//! Crawl coordinator - orchestrates the parallel crawl
//!
//! The coordinator is responsible for:
//! - Setting up the work queue, dedup cache and workers
//! - Claiming and seeding the origin
//! - Starting the watch pump in watch mode
//! - Progress snapshots while the pool runs
//! - Stop handling and final statistics

use crate::config::CrawlConfig;
use crate::error::Result;
use crate::sink::FileSink;
use crate::walker::cache::PathCache;
use crate::walker::queue::WorkQueue;
use crate::walker::quiescence::QuiescenceDetector;
use crate::walker::worker::{claim_key, log_stats, Worker, WorkerContext, WorkerStats};
use crate::watch::{DirectoryWatcher, NotifyWatcher, WatchEvent, WatchPump};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between progress snapshots
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Directories enumerated
    pub total_dirs: u64,

    /// Files handed to the sink
    pub total_files: u64,

    /// Total bytes of emitted files
    pub total_bytes: u64,

    /// Paths skipped
    pub skipped: u64,

    /// Sink failures and unreadable entries
    pub errors: u64,

    /// Children visited inline under backpressure
    pub inline_processed: u64,

    /// Submissions refused because the queue was full
    pub backpressure_events: u64,

    /// Items taken off the queue by workers
    pub dequeued: u64,

    /// Distinct paths claimed in the cache
    pub claimed: usize,

    /// Events received from the directory watcher (watch mode)
    pub watch_events: u64,

    /// Paths re-injected by the watcher (watch mode)
    pub watch_submitted: u64,

    /// Claims released after deletions (watch mode)
    pub claims_released: u64,

    /// Time taken for the crawl
    pub duration: Duration,

    /// Whether the crawl drained (vs was stopped)
    pub completed: bool,
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    /// Directories enumerated
    pub dirs: u64,

    /// Files emitted
    pub files: u64,

    /// Bytes emitted
    pub bytes: u64,

    /// Current queue length
    pub queue_len: usize,

    /// Workers counted active
    pub active_workers: usize,

    /// Total workers
    pub total_workers: usize,

    /// Inline visits so far
    pub inline: u64,

    /// Errors so far
    pub errors: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}

/// Handle for stopping a running crawl from another thread
#[derive(Clone)]
pub struct StopHandle {
    shutdown: Arc<AtomicBool>,
    detector: Arc<QuiescenceDetector>,
}

impl StopHandle {
    /// Request the crawl to stop
    ///
    /// Workers finish the path they are visiting and exit; queued paths are
    /// dropped.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.detector.stop();
    }

}

/// Watcher plus the channel its events arrive on
struct WatchSetup {
    watcher: Arc<dyn DirectoryWatcher>,
    events: Receiver<WatchEvent>,
}

/// Coordinates the parallel crawl
pub struct Crawler {
    /// Configuration
    config: Arc<CrawlConfig>,

    /// Work queue (owns the quiescence detector)
    queue: WorkQueue,

    /// Dedup cache
    cache: Arc<PathCache>,

    /// Downstream receiver of files
    sink: Arc<dyn FileSink>,

    /// Watcher, in watch mode
    watch: Option<WatchSetup>,

    /// Shared worker counters
    stats: Arc<WorkerStats>,

    /// Shutdown signal for the pump
    shutdown: Arc<AtomicBool>,
}

impl Crawler {
    /// Create a crawler for `config`
    ///
    /// In watch mode a [`NotifyWatcher`] is created and the crawl runs until
    /// stopped.
    pub fn new(config: CrawlConfig, sink: Arc<dyn FileSink>) -> Result<Self> {
        let config = config.validate()?;

        let watch = if config.watch {
            let watcher = NotifyWatcher::new()?;
            let events = watcher.events();
            Some(WatchSetup {
                watcher: Arc::new(watcher),
                events,
            })
        } else {
            None
        };

        Ok(Self::build(config, sink, watch))
    }

    /// Create a watching crawler over a caller-provided watcher
    ///
    /// `events` must carry the events of directories registered with
    /// `watcher`.
    pub fn with_watcher(
        config: CrawlConfig,
        sink: Arc<dyn FileSink>,
        watcher: Arc<dyn DirectoryWatcher>,
        events: Receiver<WatchEvent>,
    ) -> Result<Self> {
        let config = config.validate()?.with_watch(true);
        Ok(Self::build(config, sink, Some(WatchSetup { watcher, events })))
    }

    fn build(config: CrawlConfig, sink: Arc<dyn FileSink>, watch: Option<WatchSetup>) -> Self {
        let queue = if watch.is_some() {
            WorkQueue::persistent(config.queue_size)
        } else {
            WorkQueue::new(config.queue_size)
        };

        Self {
            config: Arc::new(config),
            queue,
            cache: Arc::new(PathCache::new()),
            sink,
            watch,
            stats: Arc::new(WorkerStats::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle that stops the crawl (for signal handlers)
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: Arc::clone(&self.shutdown),
            detector: self.queue.detector(),
        }
    }

    /// Termination monitor of the pool
    pub fn detector(&self) -> Arc<QuiescenceDetector> {
        self.queue.detector()
    }

    /// Current progress snapshot
    pub fn progress(&self, elapsed: Duration) -> CrawlProgress {
        CrawlProgress {
            dirs: self.stats.dirs_processed.load(Ordering::Relaxed),
            files: self.stats.files_emitted.load(Ordering::Relaxed),
            bytes: self.stats.bytes_found.load(Ordering::Relaxed),
            queue_len: self.queue.len(),
            active_workers: self.queue.detector().active(),
            total_workers: self.config.worker_count,
            inline: self.stats.inline_visits.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Run the crawl to quiescence (or until stopped in watch mode)
    pub fn run(self) -> Result<CrawlResult> {
        self.run_with_progress(|_| {})
    }

    /// Run the crawl, calling `on_progress` periodically from this thread
    pub fn run_with_progress<F>(self, mut on_progress: F) -> Result<CrawlResult>
    where
        F: FnMut(&CrawlProgress),
    {
        let start_time = Instant::now();

        info!(
            origin = %self.config.origin.display(),
            workers = self.config.worker_count,
            queue_size = self.config.queue_size,
            watch = self.config.watch,
            "Starting crawl"
        );

        self.seed_origin()?;

        let pump = match &self.watch {
            Some(watch) => Some(WatchPump::spawn(
                watch.events.clone(),
                self.queue.sender(),
                Arc::clone(&self.cache),
                Arc::clone(&watch.watcher),
                Arc::clone(&self.config),
                Arc::clone(&self.shutdown),
            )?),
            None => None,
        };

        let workers = match self.spawn_workers() {
            Ok(workers) => workers,
            Err(e) => {
                self.stop_handle().stop();
                if let Some(pump) = pump {
                    pump.join();
                }
                return Err(e);
            }
        };

        let detector = self.queue.detector();
        loop {
            if detector.wait_quiescent(PROGRESS_INTERVAL) {
                break;
            }
            if detector.is_stopped() {
                info!("Stop requested");
                break;
            }
            on_progress(&self.progress(start_time.elapsed()));
        }

        let completed = detector.is_quiesced();
        self.join_workers(workers);

        self.shutdown.store(true, Ordering::SeqCst);
        let (watch_events, watch_submitted, claims_released) = match pump {
            Some(pump) => {
                let stats = pump.join();
                (
                    stats.events.load(Ordering::Relaxed),
                    stats.submitted.load(Ordering::Relaxed),
                    stats.released.load(Ordering::Relaxed),
                )
            }
            None => (0, 0, 0),
        };

        on_progress(&self.progress(start_time.elapsed()));

        let duration = start_time.elapsed();
        log_stats(&self.stats);

        let queue_stats = self.queue.stats();
        let result = CrawlResult {
            total_dirs: self.stats.dirs_processed.load(Ordering::Relaxed),
            total_files: self.stats.files_emitted.load(Ordering::Relaxed),
            total_bytes: self.stats.bytes_found.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            inline_processed: queue_stats.inline_count(),
            backpressure_events: queue_stats.backpressure_count(),
            dequeued: queue_stats.throughput(),
            claimed: self.cache.len(),
            watch_events,
            watch_submitted,
            claims_released,
            duration,
            completed,
        };

        info!(
            dirs = result.total_dirs,
            files = result.total_files,
            errors = result.errors,
            dequeued = result.dequeued,
            backpressure = result.backpressure_events,
            completed = completed,
            watch_events = result.watch_events,
            claims_released = result.claims_released,
            duration_secs = duration.as_secs(),
            "Crawl finished"
        );

        Ok(result)
    }

    /// Claim and enqueue the origin before any worker exists
    fn seed_origin(&self) -> Result<()> {
        let origin = &self.config.origin;

        match claim_key(origin, self.config.follow_symlinks) {
            Some(key) => {
                self.cache.try_claim(&key);
                self.queue.seed(key)?;
            }
            None => {
                // Pool drains immediately
                warn!(origin = %origin.display(), "Origin cannot be resolved, nothing to crawl");
            }
        }

        Ok(())
    }

    /// Register every slot, then spawn the workers
    fn spawn_workers(&self) -> Result<Vec<Worker>> {
        let detector = self.queue.detector();
        let slots: Vec<_> = (0..self.config.worker_count)
            .map(|_| detector.register())
            .collect();

        let watcher = self.watch.as_ref().map(|w| Arc::clone(&w.watcher));
        let mut workers = Vec::with_capacity(slots.len());

        for (id, slot) in slots.into_iter().enumerate() {
            let ctx = WorkerContext {
                config: Arc::clone(&self.config),
                cache: Arc::clone(&self.cache),
                queue: self.queue.sender(),
                sink: Arc::clone(&self.sink),
                watcher: watcher.clone(),
                stats: Arc::clone(&self.stats),
            };

            match Worker::spawn(id, ctx, slot) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Unspawned slots are released as the iterator drops
                    self.stop_handle().stop();
                    self.join_workers(workers);
                    return Err(e.into());
                }
            }
        }

        info!(count = workers.len(), "Workers spawned");
        Ok(workers)
    }

    fn join_workers(&self, workers: Vec<Worker>) {
        for worker in workers {
            let id = worker.id();
            if let Err(e) = worker.join() {
                warn!(worker = id, error = %e, "Worker failed to join cleanly");
            } else {
                debug!(worker = id, "Worker joined");
            }
        }
    }
}
