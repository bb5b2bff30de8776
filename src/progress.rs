//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif progress bars.
//! Everything here writes to stderr; stdout may carry index records.

use crate::walker::{CrawlProgress, CrawlResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());

        // Fall back to the plain spinner if the template is rejected
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CrawlProgress) {
        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0}/s | Queue: {} | Inline: {} | Workers: {}/{}",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.files_per_second(),
            progress.queue_len,
            format_number(progress.inline),
            progress.active_workers,
            progress.total_workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the crawl results
pub fn print_summary(result: &CrawlResult, output: &str) {
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        result.total_files as f64 / duration_secs
    } else {
        0.0
    };

    let title = if result.completed {
        style("Crawl Complete").green().bold()
    } else {
        style("Crawl Stopped").yellow().bold()
    };

    eprintln!();
    eprintln!("{}", title);
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Directories:").bold(), format_number(result.total_dirs));
    eprintln!("  {} {}", style("Files:").bold(), format_number(result.total_files));
    eprintln!("  {} {}", style("Total Size:").bold(), format_size(result.total_bytes, BINARY));
    eprintln!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if result.inline_processed > 0 {
        eprintln!(
            "  {} {} ({} queue-full events)",
            style("Inline visits:").bold(),
            format_number(result.inline_processed),
            format_number(result.backpressure_events)
        );
    }
    if result.watch_events > 0 {
        eprintln!(
            "  {} {} events, {} re-crawled, {} claims released",
            style("Watch:").bold(),
            format_number(result.watch_events),
            format_number(result.watch_submitted),
            format_number(result.claims_released)
        );
    }
    if result.skipped > 0 {
        eprintln!("  {} {}", style("Skipped:").bold(), format_number(result.skipped));
    }
    if result.errors > 0 {
        eprintln!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(result.errors)
        );
    }
    eprintln!("  {} {}", style("Output:").bold(), output);
    eprintln!();
}

/// Print a header at the start of the crawl
pub fn print_header(origin: &str, workers: usize, queue_size: usize, output: &str, watch: bool) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("pulse-crawler").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Origin:").bold(), origin);
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!("  {} {}", style("Queue:").bold(), queue_size);
    eprintln!("  {} {}", style("Output:").bold(), output);
    if watch {
        eprintln!("  {} {}", style("Mode:").bold(), "watch (Ctrl-C to stop)");
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
