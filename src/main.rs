//! pulse-crawler - Concurrent Filesystem Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pulse_crawler::config::{CliArgs, CrawlConfig};
use pulse_crawler::progress::{print_header, print_summary, ProgressReporter};
use pulse_crawler::sink::{ExtensionTagger, FileSink, IndexEmitter, JsonLinesSink};
use pulse_crawler::walker::Crawler;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type RecordEmitter = IndexEmitter<JsonLinesSink<Box<dyn Write + Send>>, ExtensionTagger>;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    let output_name = config
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    if config.show_progress {
        print_header(
            &config.origin.display().to_string(),
            config.worker_count,
            config.queue_size,
            &output_name,
            config.watch,
        );
    }

    let writer: Box<dyn Write + Send> = match &config.output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let emitter: Arc<RecordEmitter> =
        Arc::new(IndexEmitter::new(JsonLinesSink::new(writer), ExtensionTagger));
    let sink: Arc<dyn FileSink> = Arc::clone(&emitter) as Arc<dyn FileSink>;

    let show_progress = config.show_progress;

    // Create crawler
    let crawler = Crawler::new(config, sink).context("Failed to initialize crawler")?;

    // Setup signal handler for graceful shutdown
    let stop = crawler.stop_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        stop.stop();
    })
    .context("Failed to set signal handler")?;

    // Create progress reporter
    let progress = if show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    if let Some(ref p) = progress {
        p.set_status("Crawling...");
    }

    // Run the crawl
    let result = crawler
        .run_with_progress(|snapshot| {
            if let Some(ref p) = progress {
                p.update(snapshot);
            }
        })
        .context("Crawl failed")?;

    emitter
        .sink()
        .flush()
        .context("Failed to flush index records")?;

    // Finish progress
    if let Some(ref p) = progress {
        if result.completed {
            p.finish("Crawl completed");
        } else {
            p.finish("Crawl stopped");
        }
    }

    if show_progress {
        print_summary(&result, &output_name);
    }

    if !result.completed {
        info!("Crawl was stopped before completion");
    }

    if result.errors > 0 {
        info!(errors = result.errors, "Crawl completed with errors");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pulse_crawler=debug,warn")
    } else {
        EnvFilter::new("pulse_crawler=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
