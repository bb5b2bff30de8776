//! Parallel filesystem crawler
//!
//! A fixed pool of worker threads shares one bounded queue of paths.
//! Directories are expanded into their children, every child is claimed in
//! the dedup cache exactly once, and regular files go to the sink.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │        Crawler          │
//!                     │  - claims + seeds origin│
//!                     │  - progress / stop      │
//!                     └───────────┬─────────────┘
//!                                 │ seed
//!                                 ▼
//!               ┌──────────────────────────────────┐
//!               │     WorkQueue (bounded)           │◀──── try_submit
//!               │  QuiescenceDetector (monitor)     │      (Full: inline)
//!               └───────┬──────────┬──────────┬─────┘
//!                       │ take     │          │
//!                 ┌─────▼────┐┌────▼─────┐┌───▼──────┐
//!                 │ Worker 1 ││ Worker 2 ││ Worker N │──▶ PathCache::try_claim
//!                 └─────┬────┘└────┬─────┘└───┬──────┘
//!                       └──────────┼──────────┘
//!                                  ▼
//!                             FileSink::emit
//! ```
//!
//! Termination: the last worker to go idle while the queue is empty declares
//! quiescence and wakes everyone else.

pub mod cache;
pub mod coordinator;
pub mod queue;
pub mod quiescence;
pub mod worker;

pub use cache::PathCache;
pub use coordinator::{CrawlProgress, CrawlResult, Crawler, StopHandle};
pub use queue::{TrySubmit, WorkItem, WorkQueue};
pub use quiescence::{ActiveSlot, QuiescenceDetector};
pub use worker::{WorkerContext, WorkerStats};
