//! Error types for the log tail library.

use thiserror::Error;

/// The main error type for log tail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading the tailed file or taking a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Rejected engine configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The receiving side of a subscriber has gone away.
    #[error("Subscriber closed")]
    SubscriberClosed,

    /// A subscriber failed to handle a line.
    #[error("Delivery failed: {message}")]
    Delivery { message: String },
}

impl Error {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Convenience constructor for subscriber implementations.
    pub fn delivery(message: impl Into<String>) -> Self {
        Error::Delivery {
            message: message.into(),
        }
    }
}

/// A convenient Result type for log tail operations.
pub type Result<T> = std::result::Result<T, Error>;
