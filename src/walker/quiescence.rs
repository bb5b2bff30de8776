//! Termination detection for a dynamically growing crawl
//!
//! The crawl has no task count known up front: every directory may produce
//! more work. Termination is detected with a monitor over a single
//! `active` counter and the work queue.
//!
//! # Protocol
//!
//! - A worker is counted active from [`QuiescenceDetector::register`] until it
//!   goes idle. It stays counted while visiting a path, so any work it may
//!   still produce is covered.
//! - A worker that finds the queue empty re-checks emptiness and decrements
//!   `active` under the same lock, then waits on the condition variable.
//! - Producers enqueue first and then take the lock to notify
//!   ([`QuiescenceDetector::notify_work`]). A waiter either saw the item while
//!   holding the lock or is already parked when the notification arrives.
//! - The decrement that reaches zero with the queue empty declares
//!   quiescence and wakes everyone. Woken workers re-verify the queue; they
//!   never assume work exists.
//!
//! # Correctness Invariants
//!
//! - **Safety**: quiescence is only declared when `active == 0` and the queue
//!   is empty, both observed under the lock.
//! - **Liveness**: the last worker to go idle declares quiescence.
//! - **No underflow**: decrementing below zero is an internal defect and
//!   panics.
//!
//! A persistent detector (watch mode) counts drained sweeps instead of
//! terminating; only [`QuiescenceDetector::stop`] ends its workers.

use crate::walker::queue::{WorkItem, WorkQueueReceiver};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Internal state protected by the monitor lock.
#[derive(Debug, Default)]
struct State {
    /// Workers not idle.
    active: usize,
    /// Terminal: the crawl drained (non-persistent only).
    quiesced: bool,
    /// Terminal: external stop requested.
    stopped: bool,
    /// Number of times the pool drained to zero.
    sweeps: u64,
}

/// Monitor deciding when the worker pool has run out of work
pub struct QuiescenceDetector {
    /// Queue observed for emptiness.
    queue: WorkQueueReceiver,
    /// Keep waiting after a drained sweep instead of terminating.
    persistent: bool,
    /// Mirror of `State::stopped` readable without the lock.
    stop_flag: AtomicBool,
    state: Mutex<State>,
    /// Idle workers park here.
    work_cv: Condvar,
    /// Observers of drained sweeps park here.
    idle_cv: Condvar,
}

impl QuiescenceDetector {
    /// Create a detector over `queue`
    pub fn new(queue: WorkQueueReceiver, persistent: bool) -> Self {
        Self {
            queue,
            persistent,
            stop_flag: AtomicBool::new(false),
            state: Mutex::new(State::default()),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
        }
    }

    /// Count a worker as active and hand back its slot
    ///
    /// Call on the spawning thread before the worker starts so the pool can
    /// never look drained while workers are still coming up.
    pub fn register(self: &Arc<Self>) -> ActiveSlot {
        self.state.lock().active += 1;
        ActiveSlot {
            detector: Arc::clone(self),
            registered: true,
        }
    }

    /// Take the next item for `slot`, going idle while the queue is empty
    ///
    /// Returns `None` once the crawl is quiescent or stopped; the slot is no
    /// longer counted at that point.
    pub fn take(&self, slot: &mut ActiveSlot) -> Option<WorkItem> {
        debug_assert!(std::ptr::eq(self, Arc::as_ptr(&slot.detector)));

        if !slot.registered {
            return None;
        }

        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                let mut st = self.state.lock();
                self.go_idle(&mut st);
                slot.registered = false;
                return None;
            }

            if let Some(item) = self.queue.try_take() {
                return Some(item);
            }

            if !self.await_work() {
                slot.registered = false;
                return None;
            }
        }
    }

    /// Park until the queue has work (returns `true`, still counted active)
    /// or the pool is finished (returns `false`, no longer counted).
    fn await_work(&self) -> bool {
        let mut st = self.state.lock();

        if !st.stopped && !st.quiesced && !self.queue.is_empty() {
            return true;
        }

        self.go_idle(&mut st);

        loop {
            if st.stopped || st.quiesced {
                return false;
            }
            if !self.queue.is_empty() {
                st.active += 1;
                return true;
            }
            self.work_cv.wait(&mut st);
        }
    }

    /// Decrement `active`; the caller holds the lock.
    fn go_idle(&self, st: &mut MutexGuard<'_, State>) {
        assert!(
            st.active > 0,
            "active worker count underflow: idle without matching register"
        );
        st.active -= 1;

        if st.active > 0 {
            return;
        }

        if self.queue.is_empty() && !st.stopped {
            st.sweeps += 1;
            if self.persistent {
                debug!(sweeps = st.sweeps, "Sweep drained, waiting for watch events");
            } else if !st.quiesced {
                st.quiesced = true;
                info!("Crawl quiescent");
            }
        }

        self.work_cv.notify_all();
        self.idle_cv.notify_all();
    }

    /// Wake one idle worker after an item was enqueued
    pub fn notify_work(&self) {
        let _st = self.state.lock();
        self.work_cv.notify_one();
    }

    /// Stop the pool; workers exit at their next suspension point
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        let mut st = self.state.lock();
        if !st.stopped {
            st.stopped = true;
            debug!(active = st.active, "Stop requested");
        }
        self.work_cv.notify_all();
        self.idle_cv.notify_all();
    }

    /// Number of workers currently counted active
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    /// Whether the crawl drained and terminated
    pub fn is_quiesced(&self) -> bool {
        self.state.lock().quiesced
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Number of times the pool drained to zero active workers
    pub fn sweeps(&self) -> u64 {
        self.state.lock().sweeps
    }

    /// Block until the crawl is quiescent, up to `timeout`
    pub fn wait_quiescent(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        while !st.quiesced {
            if st.stopped || self.idle_cv.wait_until(&mut st, deadline).timed_out() {
                return st.quiesced;
            }
        }
        true
    }

    /// Block until at least `min_sweeps` drains happened and the pool is idle
    ///
    /// Useful in watch mode, where the detector never quiesces.
    pub fn wait_for_sweep(&self, min_sweeps: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        loop {
            if st.sweeps >= min_sweeps && st.active == 0 && self.queue.is_empty() {
                return true;
            }
            if st.stopped || self.idle_cv.wait_until(&mut st, deadline).timed_out() {
                return st.sweeps >= min_sweeps && st.active == 0;
            }
        }
    }
}

/// A worker's registration with the detector
///
/// Dropping a slot that is still counted (a worker unwinding from a panic)
/// releases it so the rest of the pool can still terminate.
pub struct ActiveSlot {
    detector: Arc<QuiescenceDetector>,
    registered: bool,
}

impl ActiveSlot {
    /// Take the next item through the owning detector
    pub fn take(&mut self) -> Option<WorkItem> {
        let detector = Arc::clone(&self.detector);
        detector.take(self)
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        if self.registered {
            self.registered = false;
            let mut st = self.detector.state.lock();
            self.detector.go_idle(&mut st);
        }
    }
}
