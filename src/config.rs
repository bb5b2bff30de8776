//! Configuration types for pulse-crawler
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Builder-style setters for library callers

use crate::error::ConfigError;
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum queue size
const MIN_QUEUE_SIZE: usize = 1;

/// Default work queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Concurrent filesystem crawler feeding an indexing pipeline
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pulse-crawler",
    version,
    about = "Concurrent filesystem crawler feeding an indexing pipeline",
    long_about = "Crawls a directory tree with a fixed pool of worker threads and emits one\n\
                  index record per discovered file as a JSON line.\n\n\
                  With --watch, directories are registered for change notification and\n\
                  the crawler keeps running until interrupted.",
    after_help = "EXAMPLES:\n    \
        pulse-crawler /srv/share\n    \
        pulse-crawler /srv/share -w 16 --queue-size 1000 -o records.jsonl\n    \
        pulse-crawler /home --exclude '/\\.cache/' --follow-symlinks\n    \
        pulse-crawler /srv/share --watch --reprocess-modified"
)]
pub struct CliArgs {
    /// Directory to crawl
    #[arg(value_name = "ORIGIN")]
    pub origin: PathBuf,

    /// Write records to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Work queue size (controls memory usage)
    #[arg(long, default_value_t = DEFAULT_QUEUE_SIZE, value_name = "NUM")]
    pub queue_size: usize,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Follow symbolic links (paths are canonicalized before deduplication)
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Keep running and re-crawl changes reported by the filesystem
    #[arg(long)]
    pub watch: bool,

    /// In watch mode, re-emit files that are modified after being crawled
    #[arg(long, requires = "watch")]
    pub reprocess_modified: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show skips and warnings)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Crawling is I/O bound
    num_cpus::get() * 2
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Absolute path the crawl starts from
    pub origin: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Work queue capacity
    pub queue_size: usize,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Follow symlinks, deduplicating on canonical paths
    pub follow_symlinks: bool,

    /// Register directories with a watcher and run until stopped
    pub watch: bool,

    /// Re-submit already claimed paths on modification events
    pub reprocess_modified: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Record output file (stdout if unset)
    pub output_path: Option<PathBuf>,
}

impl CrawlConfig {
    /// Configuration with defaults for crawling `origin`
    pub fn new(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            worker_count: default_workers(),
            queue_size: DEFAULT_QUEUE_SIZE,
            exclude_patterns: Vec::new(),
            follow_symlinks: false,
            watch: false,
            reprocess_modified: false,
            show_progress: false,
            verbose: false,
            output_path: None,
        }
    }

    /// Set the number of workers
    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the work queue capacity
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Add an exclude pattern
    pub fn with_exclude(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.exclude_patterns.push(compile_pattern(pattern)?);
        Ok(self)
    }

    /// Follow symlinks
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Enable watch mode
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Re-submit modified paths in watch mode
    pub fn with_reprocess_modified(mut self, reprocess: bool) -> Self {
        self.reprocess_modified = reprocess;
        self
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        // Validate output path
        if let Some(output) = &args.output {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: output.clone(),
                        reason: format!("Parent directory '{}' does not exist", parent.display()),
                    });
                }
            }
        }

        let config = Self {
            origin: args.origin,
            worker_count: args.workers,
            queue_size: args.queue_size,
            exclude_patterns,
            follow_symlinks: args.follow_symlinks,
            watch: args.watch,
            reprocess_modified: args.reprocess_modified,
            show_progress: !args.quiet,
            verbose: args.verbose,
            output_path: args.output,
        };

        config.validate()
    }

    /// Check limits and make the origin absolute
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.queue_size < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: self.queue_size,
                min: MIN_QUEUE_SIZE,
            });
        }

        if self.origin.as_os_str().is_empty() {
            return Err(ConfigError::InvalidOrigin {
                path: self.origin,
                reason: "Origin path is empty".into(),
            });
        }

        // Existence is not checked here: a missing origin is skipped by the crawl
        self.origin = std::path::absolute(&self.origin).map_err(|e| ConfigError::InvalidOrigin {
            path: self.origin.clone(),
            reason: e.to_string(),
        })?;

        Ok(self)
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidExcludePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
