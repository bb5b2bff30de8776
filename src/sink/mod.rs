//! Downstream delivery of discovered files
//!
//! The crawler core only knows [`FileSink`]: one call per discovered regular
//! file. [`IndexEmitter`] is the sink used by the binary; it enriches the
//! path into an [`IndexRecord`] (owner, metadata tags, timestamp) and hands
//! the record to an [`IndexSink`] transport.

pub mod owner;
pub mod tags;

pub use owner::owner_of;
pub use tags::{meta_tags_json, ExtensionTagger, MetadataTagger};

use crate::error::{SinkError, SinkResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Module name stamped on every record
pub const MODULE_NAME: &str = "JPulseFileModule";

/// Owner reported when the lookup fails
pub const UNKNOWN_OWNER: &str = "unknown";

/// Receiver of discovered files
///
/// Called exactly once per regular file reachable from the origin. Errors
/// are logged and counted by the worker; they never stop the crawl.
pub trait FileSink: Send + Sync {
    /// Deliver one discovered file
    fn emit(&self, path: &Path) -> SinkResult<()>;
}

impl<F> FileSink for F
where
    F: Fn(&Path) -> SinkResult<()> + Send + Sync,
{
    fn emit(&self, path: &Path) -> SinkResult<()> {
        self(path)
    }
}

/// Record sent to the indexing service for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    /// Producing module
    pub module_name: String,

    /// Identity of the file within the module (its path)
    pub module_id: String,

    /// Owning user
    pub owner: String,

    /// Metadata tags (e.g. "image")
    pub tags: BTreeSet<String>,

    /// Tags in the indexer's JSON form, empty when there are none
    pub meta_tags: String,

    /// Discovery time, milliseconds since the epoch
    pub timestamp: i64,

    /// Raw content; not read by the crawler
    pub payload: Vec<u8>,

    /// Storage location hint
    pub location: String,
}

/// Transport for finished records
pub trait IndexSink: Send + Sync {
    /// Deliver one record
    fn emit(&self, record: IndexRecord) -> SinkResult<()>;
}

/// [`FileSink`] that builds an [`IndexRecord`] and forwards it
pub struct IndexEmitter<S, T> {
    sink: S,
    tagger: T,
    module_name: String,
}

impl<S: IndexSink, T: MetadataTagger> IndexEmitter<S, T> {
    /// Create an emitter with the default module name
    pub fn new(sink: S, tagger: T) -> Self {
        Self {
            sink,
            tagger,
            module_name: MODULE_NAME.to_string(),
        }
    }

    /// Override the module name stamped on records
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Get the downstream transport
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwrap the downstream transport
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Build the record for `path`
    pub fn record_for(&self, path: &Path) -> IndexRecord {
        let tags = self.tagger.tags_for(path);
        IndexRecord {
            module_name: self.module_name.clone(),
            module_id: path.to_string_lossy().into_owned(),
            owner: owner_of(path).unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
            meta_tags: meta_tags_json(&tags),
            tags,
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload: Vec::new(),
            location: String::new(),
        }
    }
}

impl<S: IndexSink, T: MetadataTagger> FileSink for IndexEmitter<S, T> {
    fn emit(&self, path: &Path) -> SinkResult<()> {
        self.sink.emit(self.record_for(path))
    }
}

/// [`IndexSink`] writing one JSON object per line
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Flush buffered records
    pub fn flush(&self) -> SinkResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> IndexSink for JsonLinesSink<W> {
    fn emit(&self, record: IndexRecord) -> SinkResult<()> {
        let line = serde_json::to_string(&record).map_err(|e| SinkError::Serialize {
            path: record.module_id.clone().into(),
            reason: e.to_string(),
        })?;

        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
