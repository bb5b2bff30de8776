//! Work queue with backpressure support
//!
//! This module provides a bounded work queue of pending paths. Tree
//! expansion submits with [`WorkQueueSender::try_submit`]; when the queue is
//! full the item is handed back and the discovering worker visits it inline
//! rather than blocking. Blocking [`WorkQueueSender::submit`] is reserved for
//! the origin seed and the directory watcher.
//!
//! Every accepted item wakes one idle worker through the queue's
//! [`QuiescenceDetector`].

use crate::error::WorkerError;
use crate::walker::quiescence::QuiescenceDetector;
use crossbeam_channel::{
    bounded, Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A path waiting to be visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Absolute path to visit
    pub path: PathBuf,
}

impl WorkItem {
    /// Create a new work item
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Borrow the path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unwrap into the path
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// Result of a non-blocking submission
#[derive(Debug)]
pub enum TrySubmit {
    /// Item was accepted by the queue
    Queued,

    /// Queue is at capacity; the caller keeps the item
    Full(WorkItem),
}

impl TrySubmit {
    /// Returns true if the item was accepted
    pub fn is_queued(&self) -> bool {
        matches!(self, TrySubmit::Queued)
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,

    /// Items visited inline due to backpressure
    pub inline_processed: AtomicU64,

    /// Number of times a submission found the queue full
    pub backpressure_events: AtomicU64,
}

impl QueueStats {
    /// Get queue throughput (dequeued items)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get number of inline-processed items
    pub fn inline_count(&self) -> u64 {
        self.inline_processed.load(Ordering::Relaxed)
    }

    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Bounded multi-producer/multi-consumer queue of pending paths
pub struct WorkQueue {
    /// Sender handle kept for seeding
    sender: WorkQueueSender,

    /// Receiver handle kept so the channel outlives the workers
    receiver: WorkQueueReceiver,

    /// Termination monitor watching this queue
    detector: Arc<QuiescenceDetector>,

    /// Queue statistics
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a queue whose workers stop once the tree is drained
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, false)
    }

    /// Create a queue whose workers keep waiting after a drained sweep
    ///
    /// Used when a directory watcher keeps producing work; only an explicit
    /// stop ends the pool.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn persistent(capacity: usize) -> Self {
        Self::build(capacity, true)
    }

    fn build(capacity: usize, persistent: bool) -> Self {
        assert!(capacity > 0, "WorkQueue capacity must be > 0");

        let (tx, rx) = bounded(capacity);
        let stats = Arc::new(QueueStats::default());

        let receiver = WorkQueueReceiver {
            receiver: rx,
            stats: Arc::clone(&stats),
        };
        let detector = Arc::new(QuiescenceDetector::new(receiver.clone(), persistent));
        let sender = WorkQueueSender {
            sender: tx,
            detector: Arc::clone(&detector),
            stats: Arc::clone(&stats),
        };

        Self {
            sender,
            receiver,
            detector,
            stats,
        }
    }

    /// Get a sender for this queue (clone for each producer)
    pub fn sender(&self) -> WorkQueueSender {
        self.sender.clone()
    }

    /// Get a receiver for this queue (clone for each consumer)
    pub fn receiver(&self) -> WorkQueueReceiver {
        self.receiver.clone()
    }

    /// Get the termination monitor for this queue
    pub fn detector(&self) -> Arc<QuiescenceDetector> {
        Arc::clone(&self.detector)
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Seed the queue with the origin path
    ///
    /// Blocks if the queue is full.
    pub fn seed(&self, origin: impl Into<PathBuf>) -> Result<(), WorkerError> {
        self.sender.submit(WorkItem::new(origin))
    }
}

/// Handle for submitting items to the queue
#[derive(Clone)]
pub struct WorkQueueSender {
    sender: Sender<WorkItem>,
    detector: Arc<QuiescenceDetector>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Try to submit an item without blocking
    ///
    /// Returns `Ok(TrySubmit::Queued)` if accepted,
    /// `Ok(TrySubmit::Full(item))` if the queue is at capacity (backpressure),
    /// and `Err` if the queue is closed.
    pub fn try_submit(&self, item: WorkItem) -> Result<TrySubmit, WorkerError> {
        match self.sender.try_send(item) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                self.detector.notify_work();
                Ok(TrySubmit::Queued)
            }
            Err(TrySendError::Full(item)) => {
                self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                Ok(TrySubmit::Full(item))
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::QueueClosed),
        }
    }

    /// Submit an item, blocking while the queue is full
    pub fn submit(&self, item: WorkItem) -> Result<(), WorkerError> {
        self.sender
            .send(item)
            .map_err(|_| WorkerError::QueueClosed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.detector.notify_work();
        Ok(())
    }

    /// Submit an item, blocking for at most `timeout` while the queue is full
    ///
    /// On timeout the item is handed back as `TrySubmit::Full`.
    pub fn submit_timeout(&self, item: WorkItem, timeout: Duration) -> Result<TrySubmit, WorkerError> {
        match self.sender.send_timeout(item, timeout) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                self.detector.notify_work();
                Ok(TrySubmit::Queued)
            }
            Err(SendTimeoutError::Timeout(item)) => Ok(TrySubmit::Full(item)),
            Err(SendTimeoutError::Disconnected(_)) => Err(WorkerError::QueueClosed),
        }
    }

    /// Record that an item was visited inline (for stats)
    pub fn record_inline(&self) {
        self.stats.inline_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle for taking items from the queue
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Take an item from the queue
    ///
    /// This will block until an item is available or the queue is
    /// disconnected. Pool workers go through
    /// [`QuiescenceDetector::take`] instead, which adds idle tracking.
    pub fn take(&self) -> Option<WorkItem> {
        match self.receiver.recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Try to take an item without blocking
    pub fn try_take(&self) -> Option<WorkItem> {
        match self.receiver.try_recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take with timeout
    pub fn take_timeout(&self, timeout: Duration) -> Option<WorkItem> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_queue_basic() {
        let queue = WorkQueue::new(10);

        queue.seed("/test").unwrap();
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 1);

        let receiver = queue.receiver();
        let item = receiver.take().unwrap();
        assert_eq!(item.path(), Path::new("/test"));
    }

    #[test]
    fn test_queue_backpressure() {
        let queue = WorkQueue::new(2);
        let sender = queue.sender();

        // Fill the queue
        assert!(sender.try_submit(WorkItem::new("/a")).unwrap().is_queued());
        assert!(sender.try_submit(WorkItem::new("/b")).unwrap().is_queued());

        // Queue is full - item comes back to the caller
        match sender.try_submit(WorkItem::new("/c")).unwrap() {
            TrySubmit::Full(item) => assert_eq!(item.path(), Path::new("/c")),
            TrySubmit::Queued => panic!("queue should be full"),
        }

        assert_eq!(queue.stats().backpressure_count(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_blocking_submit_waits_for_space() {
        let queue = WorkQueue::new(1);
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.submit(WorkItem::new("/first")).unwrap();

        let producer = thread::spawn(move || sender.submit(WorkItem::new("/second")));

        // The producer is parked until we make room
        assert_eq!(receiver.take().unwrap().path(), Path::new("/first"));
        producer.join().unwrap().unwrap();
        assert_eq!(receiver.take().unwrap().path(), Path::new("/second"));
    }

    #[test]
    fn test_seed_wakes_detector() {
        let queue = WorkQueue::new(10);
        let detector = queue.detector();

        let mut slot = detector.register();
        queue.seed("/test").unwrap();

        // The seeded item is handed out before the pool can drain
        assert_eq!(slot.take().unwrap().path(), Path::new("/test"));
        assert!(!detector.is_quiesced());
        assert_eq!(detector.active(), 1);

        assert!(slot.take().is_none());
        assert!(detector.is_quiesced());
    }

    #[test]
    fn test_queue_stats() {
        let queue = WorkQueue::new(10);
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.submit(WorkItem::new("/a")).unwrap();
        sender.submit(WorkItem::new("/b")).unwrap();

        receiver.take().unwrap();
        receiver.try_take().unwrap();
        assert!(receiver.try_take().is_none());
        assert!(receiver
            .take_timeout(Duration::from_millis(10))
            .is_none());

        let stats = queue.stats();
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.throughput(), 2);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_rejected() {
        let _ = WorkQueue::new(0);
    }
}
