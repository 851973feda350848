//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

use crate::watcher::WatcherState;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The watched path does not exist or is not a directory.
    #[error("not an existing directory: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The event source failed while polling.
    #[error("event source error: {0}")]
    Source(String),

    /// Lifecycle misuse, e.g. `init()` on a destroyed watcher.
    #[error("cannot {operation} while watcher is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: WatcherState,
    },

    /// The watch loop thread could not be spawned.
    #[error("failed to spawn watch loop thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}
