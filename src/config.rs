//! Engine configuration.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Default number of history lines handed to a newly attached consumer.
pub const DEFAULT_INITIAL_LINES: usize = 10;
/// Default cap on an unterminated line before it is force-emitted.
pub const DEFAULT_MAX_PARTIAL_LINE: usize = 1024 * 1024;
/// Default block size for backward snapshot reads.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;
/// Default chunk size for forward reads in the tail loop.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Settings for a [`TailEngine`](crate::TailEngine).
///
/// Built with [`TailConfig::new`] and the chained setters:
///
/// ```
/// use log_tail::TailConfig;
/// use std::time::Duration;
///
/// let config = TailConfig::new("app.log")
///     .poll_interval(Duration::from_millis(50))
///     .initial_lines(25);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// File to tail.
    pub path: PathBuf,
    /// Wait between poll cycles.
    pub poll_interval: Duration,
    /// History lines returned by [`TailEngine::attach`](crate::TailEngine::attach).
    pub initial_lines: usize,
    /// Unterminated bytes buffered before a forced line is emitted.
    pub max_partial_line: usize,
    /// Block size for backward snapshot reads.
    pub block_size: usize,
    /// Chunk size for forward reads.
    pub read_chunk_size: usize,
    pub start_at_end: bool,
    pub flush_partial_on_rotation: bool,
    pub watch_events: bool,
}

impl TailConfig {
    /// Creates a configuration for `path` with every other setting at its default.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_lines: DEFAULT_INITIAL_LINES,
            max_partial_line: DEFAULT_MAX_PARTIAL_LINE,
            block_size: DEFAULT_BLOCK_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            start_at_end: true,
            flush_partial_on_rotation: false,
            watch_events: true,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn initial_lines(mut self, lines: usize) -> Self {
        self.initial_lines = lines;
        self
    }

    pub fn max_partial_line(mut self, bytes: usize) -> Self {
        self.max_partial_line = bytes;
        self
    }

    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.read_chunk_size = bytes;
        self
    }

    /// When `false`, content already in the file when it is first opened is
    /// tailed as well.
    pub fn start_at_end(mut self, start_at_end: bool) -> Self {
        self.start_at_end = start_at_end;
        self
    }

    /// Emit a dangling unterminated line as a forced line on rotation instead
    /// of dropping it.
    pub fn flush_partial_on_rotation(mut self, flush: bool) -> Self {
        self.flush_partial_on_rotation = flush;
        self
    }

    /// Use filesystem notifications to wake the poll loop early.
    pub fn watch_events(mut self, watch: bool) -> Self {
        self.watch_events = watch;
        self
    }

    /// Checks the settings the engine cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::invalid_config("file path must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config(
                "poll interval must be greater than zero",
            ));
        }
        if self.max_partial_line == 0 {
            return Err(Error::invalid_config(
                "maximum partial line size must be greater than zero",
            ));
        }
        if self.block_size == 0 {
            return Err(Error::invalid_config(
                "block size must be greater than zero",
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(Error::invalid_config(
                "read chunk size must be greater than zero",
            ));
        }
        Ok(())
    }
}
