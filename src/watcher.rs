//! Filesystem notifications used to wake the poll loop early.

use crate::error::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Watches the directory holding the tailed file.
///
/// The directory is watched rather than the file so that events keep
/// arriving across truncation, deletion and recreation of the file.
pub(crate) struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    file_path: PathBuf,
    file_name: OsString,
}

impl FileWatcher {
    /// Creates a watcher for `path`'s parent directory and starts watching.
    pub(crate) fn watch<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(watch_dir(&file_path), RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            file_path,
            file_name,
        })
    }

    /// Waits for the next event that names the tailed file.
    ///
    /// Errors from the backend are passed through. Returns `None` once the
    /// backend has shut down.
    pub(crate) async fn next_relevant(&mut self) -> Option<notify::Result<Event>> {
        loop {
            match self.receiver.recv().await? {
                Ok(event) if !is_event_relevant_to_file(&event, &self.file_name) => continue,
                other => return Some(other),
            }
        }
    }

    /// Discards events that are already queued, returning how many there were.
    pub(crate) fn drain_queued(&mut self) -> usize {
        drain_queued(&mut self.receiver)
    }

    pub(crate) fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn drain_queued<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> usize {
    let mut drained = 0;
    while receiver.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

/// Directory to watch for `path`; a bare file name means the current directory.
fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &OsString) -> bool {
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(target_file_name.as_os_str()))
}
