//! File change events and the kinds a watcher can subscribe to.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File was created (or renamed into the directory).
    Created,

    /// File contents or metadata changed.
    Modified,

    /// File was deleted (or renamed out of the directory).
    Deleted,
}

impl ChangeKind {
    /// The single-kind set containing this kind.
    pub fn as_kinds(self) -> EventKinds {
        match self {
            Self::Created => EventKinds::CREATED,
            Self::Modified => EventKinds::MODIFIED,
            Self::Deleted => EventKinds::DELETED,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Set of change kinds a watcher is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKinds: u8 {
        const CREATED = 1 << 0;
        const MODIFIED = 1 << 1;
        const DELETED = 1 << 2;
    }
}

impl EventKinds {
    /// Whether `kind` is part of this set.
    pub fn includes(self, kind: ChangeKind) -> bool {
        self.contains(kind.as_kinds())
    }
}

impl From<ChangeKind> for EventKinds {
    fn from(kind: ChangeKind) -> Self {
        kind.as_kinds()
    }
}

impl FromIterator<ChangeKind> for EventKinds {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |kinds, kind| kinds | kind.as_kinds())
    }
}

/// An event as reported by an event source, before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: ChangeKind,

    /// File name relative to the watched directory.
    pub file_name: PathBuf,
}

impl RawEvent {
    pub fn new(kind: ChangeKind, file_name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file_name: file_name.into(),
        }
    }
}

/// A change dispatched to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// The kind of change.
    pub kind: ChangeKind,

    /// Name of the affected file, relative to the watched directory.
    pub file_name: PathBuf,

    /// When the watch loop received the event.
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    /// Create a new event stamped with the current time.
    pub fn new(kind: ChangeKind, file_name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file_name: file_name.into(),
            timestamp: Utc::now(),
        }
    }

    /// The affected file name.
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }
}

impl From<RawEvent> for FileChangeEvent {
    fn from(raw: RawEvent) -> Self {
        Self::new(raw.kind, raw.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kinds_from_iter() {
        let kinds: EventKinds = [ChangeKind::Created, ChangeKind::Deleted]
            .into_iter()
            .collect();

        assert!(kinds.includes(ChangeKind::Created));
        assert!(kinds.includes(ChangeKind::Deleted));
        assert!(!kinds.includes(ChangeKind::Modified));
    }

    #[test]
    fn test_event_from_raw() {
        let event = FileChangeEvent::from(RawEvent::new(ChangeKind::Modified, "a.json"));
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.file_name(), Path::new("a.json"));
    }

    #[test]
    fn test_event_serializes_kind_in_snake_case() {
        let event = FileChangeEvent::new(ChangeKind::Created, "testCreate");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "created");
        assert_eq!(json["file_name"], "testCreate");
    }
}
