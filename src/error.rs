//! Error types for pulse-crawler
//!
//! This module defines the error hierarchy for:
//! - Configuration and CLI validation
//! - Worker thread and queue failures
//! - Directory watch registration and event delivery
//! - Downstream sink delivery
//!
//! Per-path I/O problems are not errors at the crawl level. They are reported
//! as a [`VisitOutcome::Skipped`] and the worker moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Directory watcher errors
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Downstream sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O errors (output files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Origin could not be resolved to an absolute path
    #[error("Invalid origin '{path}': {reason}")]
    InvalidOrigin { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Work queue has no receivers left
    #[error("Failed to send work item: queue closed")]
    QueueClosed,

    /// Worker thread could not be started
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Directory watcher errors
#[derive(Error, Debug)]
pub enum WatchError {
    /// The OS watch backend could not be created
    #[error("Failed to initialize directory watcher: {0}")]
    InitFailed(String),

    /// A single directory could not be registered
    #[error("Failed to watch '{path}': {reason}")]
    RegisterFailed { path: PathBuf, reason: String },

    /// The event pump thread could not be started
    #[error("Failed to start watch pump: {0}")]
    PumpFailed(String),
}

/// Downstream sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// Record could not be serialized
    #[error("Failed to serialize record for '{path}': {reason}")]
    Serialize { path: PathBuf, reason: String },

    /// Record could not be written to the transport
    #[error("Failed to write record: {0}")]
    Io(#[from] std::io::Error),

    /// Sink rejected the record
    #[error("Sink rejected '{path}': {reason}")]
    Rejected { path: PathBuf, reason: String },
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for SinkError
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Represents the outcome of visiting a single path
#[derive(Debug)]
pub enum VisitOutcome {
    /// Regular file handed to the sink
    Emitted { path: PathBuf },

    /// Directory enumerated
    Expanded {
        path: PathBuf,
        children: usize,
        queued: usize,
        inline: usize,
    },

    /// Skipped due to a recoverable condition (missing, unreadable, symlink, ...)
    Skipped { path: PathBuf, reason: String },

    /// The sink failed for this file
    Failed { path: PathBuf, error: SinkError },
}
