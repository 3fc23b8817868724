//! The tail engine: a background poll loop plus the handle that controls it.

use crate::config::TailConfig;
use crate::decoder::LineDecoder;
use crate::error::Result;
use crate::reader::{LastLinesReader, ensure_not_directory};
use crate::registry::{BroadcastRegistry, LineSubscriber, SubscriptionId};
use crate::stream::LineStream;
use crate::watcher::FileWatcher;
use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shortest time `stop` waits for the loop before aborting it.
const MIN_STOP_GRACE: Duration = Duration::from_secs(1);

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// The file does not exist yet (or went away); waiting for it.
    AwaitingFile,
    /// Following appends to the open file.
    Tailing,
    /// Truncation or replacement was detected and the file is being reopened.
    Rotated,
    /// The loop has exited and released the file.
    Stopped,
}

/// Handle to a running tail loop.
///
/// The loop runs on its own tokio task and is the only owner of the read
/// cursor and the partial line buffer. Lines reach the outside world only
/// through the [`BroadcastRegistry`].
pub struct TailEngine {
    path: PathBuf,
    initial_lines: usize,
    poll_interval: Duration,
    reader: LastLinesReader,
    registry: Arc<BroadcastRegistry>,
    state_rx: watch::Receiver<TailState>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TailEngine {
    /// Validates `config` and starts tailing with a fresh registry.
    pub async fn start(config: TailConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(BroadcastRegistry::new())).await
    }

    /// Starts tailing, broadcasting into an existing registry.
    pub async fn with_registry(config: TailConfig, registry: Arc<BroadcastRegistry>) -> Result<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(TailState::AwaitingFile);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let watcher = if config.watch_events {
            match FileWatcher::watch(&config.path) {
                Ok(watcher) => {
                    debug!(path = %watcher.file_path().display(), "Watching for file events");
                    Some(watcher)
                }
                Err(e) => {
                    debug!(
                        path = %config.path.display(),
                        error = %e,
                        "File events unavailable, relying on polling"
                    );
                    None
                }
            }
        } else {
            None
        };

        let engine = TailEngine {
            path: config.path.clone(),
            initial_lines: config.initial_lines,
            poll_interval: config.poll_interval,
            reader: LastLinesReader::new(config.block_size),
            registry: Arc::clone(&registry),
            state_rx,
            shutdown_tx,
            task: Mutex::new(None),
        };

        let tailer = Tailer::new(config, registry, state_tx);
        let handle = tokio::spawn(tailer.run(shutdown_rx, watcher));
        *engine.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(engine)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<BroadcastRegistry> {
        &self.registry
    }

    pub fn state(&self) -> TailState {
        *self.state_rx.borrow()
    }

    /// Receiver that is notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<TailState> {
        self.state_rx.clone()
    }

    /// Registers a closure for every line tailed from now on.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.register_fn(handler)
    }

    /// Registers a subscriber by identity.
    pub fn subscribe_with(&self, subscriber: Arc<dyn LineSubscriber>) -> SubscriptionId {
        self.registry.register(subscriber)
    }

    /// Removes a subscription; unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unregister(id);
    }

    /// A stream of every line tailed from now on.
    pub fn stream(&self) -> LineStream {
        LineStream::subscribe(&self.registry)
    }

    /// Reads the last `n` lines straight from disk, independent of the loop.
    pub async fn read_last_lines(&self, n: usize) -> Result<Vec<String>> {
        self.reader.read_last_lines(&self.path, n).await
    }

    /// Attaches a new consumer: subscribes first, then reads the configured
    /// number of history lines.
    ///
    /// A line appended between the two steps may appear both in the history
    /// and on the stream, but never in neither.
    pub async fn attach(&self) -> Result<(Vec<String>, LineStream)> {
        let stream = self.stream();
        let history = self.read_last_lines(self.initial_lines).await?;
        Ok((history, stream))
    }

    /// Signals the loop to stop and waits for it to release the file.
    ///
    /// Waits at most the poll interval (and at least one second) before
    /// aborting the task. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());

        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        let grace = self.poll_interval.max(MIN_STOP_GRACE);
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(path = %self.path.display(), "Tail loop did not stop in time, aborting");
            handle.abort();
        }
    }
}

impl Drop for TailEngine {
    fn drop(&mut self) {
        // The loop exits on its own once it sees the signal
        let _ = self.shutdown_tx.send(());
    }
}

impl std::fmt::Debug for TailEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailEngine")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}

/// Identity of an open file, used to spot replacement at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileIdentity {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(_metadata: &Metadata) -> Self {
        FileIdentity {}
    }
}

/// The state owned by the poll loop.
struct Tailer {
    path: PathBuf,
    poll_interval: Duration,
    read_chunk_size: usize,
    flush_partial_on_rotation: bool,
    start_at_end: bool,
    decoder: LineDecoder,
    registry: Arc<BroadcastRegistry>,
    state_tx: watch::Sender<TailState>,
    file: Option<File>,
    identity: Option<FileIdentity>,
    cursor: u64,
}

enum Wake {
    Poll,
    Stop,
}

impl Tailer {
    fn new(config: TailConfig, registry: Arc<BroadcastRegistry>, state_tx: watch::Sender<TailState>) -> Self {
        Tailer {
            path: config.path,
            poll_interval: config.poll_interval,
            read_chunk_size: config.read_chunk_size,
            flush_partial_on_rotation: config.flush_partial_on_rotation,
            start_at_end: config.start_at_end,
            decoder: LineDecoder::new(config.max_partial_line),
            registry,
            state_tx,
            file: None,
            identity: None,
            cursor: 0,
        }
    }

    async fn run(
        mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
        mut watcher: Option<FileWatcher>,
    ) {
        info!(path = %self.path.display(), "Tail loop started");

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(path = %self.path.display(), error = %e, "Poll cycle failed, retrying");
            }

            match wait_for_next_cycle(self.poll_interval, &mut shutdown_rx, &mut watcher).await {
                Wake::Poll => {}
                Wake::Stop => break,
            }
        }

        self.file = None;
        self.set_state(TailState::Stopped);
        info!(path = %self.path.display(), cursor = self.cursor, "Tail loop stopped");
    }

    /// Runs one cycle: find or check the file, handle rotation, read appends.
    async fn poll_once(&mut self) -> Result<()> {
        let metadata = match fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.file_missing();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let current_size = if self.file.is_none() {
            let len = self.open().await?;
            self.set_state(TailState::Tailing);
            len
        } else {
            let replaced = self.identity != Some(FileIdentity::of(&metadata));
            if replaced || detect_file_truncation(metadata.len(), self.cursor) {
                self.rotate(replaced).await?
            } else {
                metadata.len()
            }
        };

        if let Some(bytes) = calculate_bytes_to_read(current_size, self.cursor) {
            self.read_appended(bytes).await?;
        }

        Ok(())
    }

    /// Opens the file, places the cursor and returns the file's length.
    ///
    /// The very first open honours `start_at_end`; any later open is of a new
    /// file and starts at offset 0.
    async fn open(&mut self) -> Result<u64> {
        let file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;
        ensure_not_directory(&metadata, &self.path)?;

        self.cursor = if self.start_at_end { metadata.len() } else { 0 };
        self.start_at_end = false;
        self.identity = Some(FileIdentity::of(&metadata));
        self.file = Some(file);

        info!(path = %self.path.display(), cursor = self.cursor, "Opened file for tailing");
        Ok(metadata.len())
    }

    async fn rotate(&mut self, replaced: bool) -> Result<u64> {
        self.set_state(TailState::Rotated);
        info!(
            path = %self.path.display(),
            cursor = self.cursor,
            replaced,
            "File truncated or rotated, reopening"
        );

        self.settle_partial();

        self.file = None;
        self.identity = None;
        self.cursor = 0;
        let len = self.open().await?;
        self.set_state(TailState::Tailing);
        Ok(len)
    }

    /// Reads `bytes_to_read` bytes from the cursor in bounded chunks and
    /// broadcasts every completed line.
    async fn read_appended(&mut self, bytes_to_read: u64) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.seek(SeekFrom::Start(self.cursor)).await?;

        let mut buffer = vec![0u8; self.read_chunk_size];
        let mut remaining = bytes_to_read;

        while remaining > 0 {
            let to_read = remaining.min(buffer.len() as u64) as usize;
            let read = file.read(&mut buffer[..to_read]).await?;
            if read == 0 {
                break;
            }

            self.cursor += read as u64;
            remaining -= read as u64;

            for line in self.decoder.feed(&buffer[..read]) {
                self.registry.broadcast(&line);
            }
        }

        Ok(())
    }

    fn file_missing(&mut self) {
        if self.file.take().is_some() {
            info!(path = %self.path.display(), "File disappeared, waiting for it to return");
            self.identity = None;
            self.cursor = 0;
            self.settle_partial();
        }
        self.set_state(TailState::AwaitingFile);
    }

    /// Emits or discards the unterminated line left by the previous file.
    fn settle_partial(&mut self) {
        if self.flush_partial_on_rotation {
            if let Some(line) = self.decoder.flush() {
                self.registry.broadcast(&line);
            }
        } else {
            let dropped = self.decoder.clear();
            if dropped > 0 {
                debug!(bytes = dropped, "Dropped unterminated line from before rotation");
            }
        }
    }

    fn set_state(&self, state: TailState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Sleeps for one poll interval, returning early on shutdown or on a file
/// event for the tailed file.
async fn wait_for_next_cycle(
    interval: Duration,
    shutdown_rx: &mut broadcast::Receiver<()>,
    watcher: &mut Option<FileWatcher>,
) -> Wake {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            // A send or a dropped sender both mean stop
            _ = shutdown_rx.recv() => return Wake::Stop,

            _ = &mut sleep => return Wake::Poll,

            event = next_watch_event(watcher) => match event {
                Some(Ok(_)) => {
                    // One cycle covers every event queued so far
                    if let Some(watcher) = watcher.as_mut() {
                        watcher.drain_queued();
                    }
                    return Wake::Poll;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "File watcher reported an error");
                }
                None => {
                    debug!("File watcher closed, relying on polling");
                    *watcher = None;
                }
            },
        }
    }
}

async fn next_watch_event(watcher: &mut Option<FileWatcher>) -> Option<notify::Result<notify::Event>> {
    match watcher {
        Some(watcher) => watcher.next_relevant().await,
        None => std::future::pending().await,
    }
}

/// Detect if the file was truncated by comparing current size with the cursor
fn detect_file_truncation(current_size: u64, cursor: u64) -> bool {
    current_size < cursor
}

/// Calculate bytes to read based on current size and the cursor
fn calculate_bytes_to_read(current_size: u64, cursor: u64) -> Option<u64> {
    if current_size <= cursor {
        None
    } else {
        Some(current_size - cursor)
    }
}
