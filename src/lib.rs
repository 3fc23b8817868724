//! A log tail library that follows a growing file and broadcasts each new line.
//!
//! A [`TailEngine`] polls one file in the background, reassembles lines
//! across reads, survives truncation and rotation, and hands every completed
//! line to the subscribers in its [`BroadcastRegistry`]. The last lines of the
//! file can be read at any time for consumers that want history first.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tail::{TailConfig, tail_log};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = tail_log(TailConfig::new("app.log")).await?;
//!     let (history, mut lines) = engine.attach().await?;
//!
//!     for line in history {
//!         println!("{}", line);
//!     }
//!     while let Some(line) = lines.next().await {
//!         println!("{}", line);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;
mod decoder;
mod engine;
mod error;
mod reader;
mod registry;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

pub use config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_INITIAL_LINES, DEFAULT_MAX_PARTIAL_LINE, DEFAULT_POLL_INTERVAL,
    DEFAULT_READ_CHUNK_SIZE, TailConfig,
};
pub use decoder::LineDecoder;
pub use engine::{TailEngine, TailState};
pub use error::{Error, Result};
pub use reader::LastLinesReader;
pub use registry::{BroadcastRegistry, LineSubscriber, SubscriptionId};
pub use stream::LineStream;

use std::path::Path;

/// Starts tailing the file described by `config`.
///
/// # Example
///
/// ```rust,no_run
/// use log_tail::{TailConfig, tail_log};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TailConfig::new("app.log").poll_interval(Duration::from_millis(100));
///     let engine = tail_log(config).await?;
///
///     engine.subscribe(|line: &str| {
///         println!("{}", line);
///         Ok(())
///     });
///
///     tokio::signal::ctrl_c().await?;
///     engine.stop().await;
///     Ok(())
/// }
/// ```
pub async fn tail_log(config: TailConfig) -> Result<TailEngine> {
    TailEngine::start(config).await
}

/// Reads the last `n` lines of `path`, oldest first, without starting an engine.
pub async fn read_last_lines<P: AsRef<Path>>(path: P, n: usize) -> Result<Vec<String>> {
    LastLinesReader::default().read_last_lines(path, n).await
}
