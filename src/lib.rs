//! pulse-crawler - Concurrent Filesystem Crawler
//!
//! Discovers every file under an origin directory with a fixed pool of
//! worker threads and hands each one, exactly once, to a downstream sink.
//! Optionally keeps watching crawled directories and feeds changes back in.
//!
//! # Features
//!
//! - **Bounded Memory**: The work queue has a fixed capacity. When it is
//!   full a worker visits the child itself instead of blocking.
//!
//! - **Exactly Once**: A concurrent path cache guarantees each path is
//!   claimed by a single worker, even when symlinks alias the same target.
//!
//! - **Clean Termination**: An explicit monitor tracks idle workers and ends
//!   the crawl when the queue is empty and nobody can produce more work.
//!
//! - **Watch Mode**: Directories are registered with the platform watcher on
//!   first visit; created and modified entries are re-crawled.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   seed    ┌──────────────────┐   take    ┌──────────────┐
//! │   Crawler    │ ────────▶ │  Work Queue      │ ────────▶ │   Workers    │
//! │  (origin)    │           │ (crossbeam, cap) │ ◀──────── │  (N threads) │
//! └──────────────┘           └────────▲─────────┘  children └──────┬───────┘
//!                                     │                            │ files
//!                            ┌────────┴─────────┐                  ▼
//!                            │    WatchPump     │           ┌──────────────┐
//!                            │ (--watch only)   │           │ IndexEmitter │
//!                            └──────────────────┘           │  JSON lines  │
//!                                                           └──────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Crawl once and write index records to a file
//! pulse-crawler /srv/share -o records.jsonl
//!
//! # Keep watching for changes
//! pulse-crawler /srv/share --watch
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod sink;
pub mod walker;
pub mod watch;

pub use config::{CliArgs, CrawlConfig};
pub use error::{CrawlerError, Result};
pub use sink::{FileSink, IndexEmitter, IndexRecord, IndexSink, JsonLinesSink};
pub use walker::{CrawlProgress, CrawlResult, Crawler, StopHandle};
