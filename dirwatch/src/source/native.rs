//! Event source backed by the platform's native watcher.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace};

use super::{EventSource, EventSubscription, NextEvent};
use crate::error::{Result, WatcherError};
use crate::event::{ChangeKind, EventKinds, RawEvent};

/// Watches directories with [`notify::RecommendedWatcher`].
///
/// Only direct children of the registered directory are reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl NotifySource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for NotifySource {
    fn register(&self, path: &Path, kinds: EventKinds) -> Result<Box<dyn EventSubscription>> {
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is gone once the subscription is closed.
            let _ = tx.send(res);
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), ?kinds, "registered native watch");

        Ok(Box::new(NotifySubscription {
            root: path.to_path_buf(),
            kinds,
            watcher: Some(watcher),
            events: rx,
            pending: VecDeque::new(),
        }))
    }
}

struct NotifySubscription {
    root: PathBuf,
    kinds: EventKinds,
    watcher: Option<RecommendedWatcher>,
    events: Receiver<notify::Result<Event>>,
    /// A single notify event can carry several paths.
    pending: VecDeque<RawEvent>,
}

impl EventSubscription for NotifySubscription {
    fn next_event(&mut self, timeout: Duration) -> Result<NextEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(NextEvent::Event(event));
        }
        if self.watcher.is_none() {
            return Ok(NextEvent::Closed);
        }

        match self.events.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                trace!(?event, "raw notify event");
                self.pending
                    .extend(translate(&self.root, self.kinds, event));
                Ok(self
                    .pending
                    .pop_front()
                    .map_or(NextEvent::Idle, NextEvent::Event))
            }
            Ok(Err(err)) => Err(WatcherError::Source(err.to_string())),
            Err(RecvTimeoutError::Timeout) => Ok(NextEvent::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(NextEvent::Closed),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.pending.clear();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.unwatch(&self.root)?;
            debug!(path = %self.root.display(), "released native watch");
        }
        Ok(())
    }
}

/// Map a notify event onto zero or more raw events for `root`.
fn translate(root: &Path, kinds: EventKinds, event: Event) -> Vec<RawEvent> {
    let Event { kind, paths, .. } = event;

    paths
        .into_iter()
        .filter_map(|path| {
            let change = classify(kind, &path)?;
            if !kinds.includes(change) {
                return None;
            }
            relative_name(root, &path).map(|name| RawEvent::new(change, name))
        })
        .collect()
}

fn classify(kind: EventKind, path: &Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => Some(ChangeKind::Deleted),
            RenameMode::To => Some(ChangeKind::Created),
            // Backends that pair renames also emit the From and To halves.
            RenameMode::Both => None,
            RenameMode::Any | RenameMode::Other => {
                if path.exists() {
                    Some(ChangeKind::Created)
                } else {
                    Some(ChangeKind::Deleted)
                }
            }
        },
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Name of `path` relative to `root`, or `None` for the root itself.
fn relative_name(root: &Path, path: &Path) -> Option<PathBuf> {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => None,
        Ok(relative) => Some(relative.to_path_buf()),
        Err(_) => path.file_name().map(PathBuf::from),
    }
}
