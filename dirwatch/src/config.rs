//! Configuration for a directory watcher.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{ChangeKind, EventKinds};

/// Default wait between cancellation checks of the watch loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Configuration for a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Path to the directory.
    pub path: PathBuf,

    /// Change kinds to report.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ChangeKind>,

    /// Only dispatch events whose file name ends with this suffix.
    #[serde(default)]
    pub filename_extension_include: Option<String>,

    /// How long the loop waits for an event before re-checking for
    /// cancellation, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatcherConfig {
    /// Create a config watching `path` for created files.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kinds: default_kinds(),
            filename_extension_include: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Set the change kinds to report.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Set the extension filter.
    pub fn with_extension(mut self, suffix: impl Into<String>) -> Self {
        self.filename_extension_include = Some(suffix.into());
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The configured kinds as a set.
    pub fn event_kinds(&self) -> EventKinds {
        self.kinds.iter().copied().collect()
    }

    /// The poll interval, never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_kinds() -> Vec<ChangeKind> {
    vec![ChangeKind::Created]
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
