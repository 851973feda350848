//! Directory watcher implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DEFAULT_POLL_INTERVAL_MS, WatcherConfig};
use crate::error::{Result, WatcherError};
use crate::event::{EventKinds, FileChangeEvent};
use crate::filter::ExtensionFilter;
use crate::handler::{Callback, FallibleCallback, Handler, HandlerRegistry};
use crate::source::{EventSource, NotifySource};
use crate::watch_loop::{LoopExit, WatchLoop};

/// Lifecycle of a [`DirectoryWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Constructed; handlers can be added, nothing is watched yet.
    Created,

    /// Registered with the event source; the watch loop is running.
    Initialized,

    /// Stopped for good.
    Destroyed,
}

struct Lifecycle {
    state: WatcherState,
    loop_thread: Option<ThreadId>,
}

/// Watches one directory and dispatches changes to registered handlers.
///
/// Handlers run on a dedicated background thread, synchronously and in
/// registration order. All methods take `&self`, so a watcher can be shared
/// behind an `Arc`, including with its own handlers.
///
/// ```no_run
/// use dirwatch::{ChangeKind, DirectoryWatcher};
///
/// # fn main() -> dirwatch::Result<()> {
/// let watcher = DirectoryWatcher::new("/srv/inbox", ChangeKind::Created)?;
/// watcher.set_filename_extension_include(Some(".json"));
/// watcher.add_handler(|event| println!("new file: {}", event.file_name.display()))?;
/// watcher.init()?;
/// // ...
/// watcher.destroy();
/// # Ok(())
/// # }
/// ```
pub struct DirectoryWatcher {
    /// Canonical path of the watched directory.
    path: PathBuf,

    /// Kinds registered with the source.
    kinds: EventKinds,

    source: Box<dyn EventSource>,
    handlers: HandlerRegistry,
    filter: ExtensionFilter,
    poll_interval: Duration,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,

    /// Only locked long enough to store or take the handle.
    worker: Mutex<Option<JoinHandle<LoopExit>>>,

    /// Held across the join so concurrent `destroy` calls all wait for it.
    /// Never taken on the loop thread.
    join: Mutex<()>,

    /// Set while the loop thread is alive.
    running: Arc<AtomicBool>,
}

impl DirectoryWatcher {
    /// Create a watcher backed by the platform's native notifications.
    ///
    /// Fails with [`WatcherError::InvalidPath`] unless `path` is an
    /// existing directory.
    pub fn new(path: impl AsRef<Path>, kinds: impl Into<EventKinds>) -> Result<Self> {
        Self::with_source(path, kinds, NotifySource::new())
    }

    /// Create a watcher that takes its events from `source`.
    pub fn with_source(
        path: impl AsRef<Path>,
        kinds: impl Into<EventKinds>,
        source: impl EventSource + 'static,
    ) -> Result<Self> {
        let requested = path.as_ref();
        let path = match requested.canonicalize() {
            Ok(path) if path.is_dir() => path,
            _ => return Err(WatcherError::InvalidPath(requested.to_path_buf())),
        };

        Ok(Self {
            path,
            kinds: kinds.into(),
            source: Box::new(source),
            handlers: HandlerRegistry::new(),
            filter: ExtensionFilter::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: WatcherState::Created,
                loop_thread: None,
            }),
            worker: Mutex::new(None),
            join: Mutex::new(()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a native watcher from configuration.
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        Self::from_config_with_source(config, NotifySource::new())
    }

    /// Create a watcher from configuration with a custom source.
    pub fn from_config_with_source(
        config: &WatcherConfig,
        source: impl EventSource + 'static,
    ) -> Result<Self> {
        let watcher = Self::with_source(&config.path, config.event_kinds(), source)?
            .with_poll_interval(config.poll_interval());
        watcher
            .filter
            .set_suffix(config.filename_extension_include.clone());
        Ok(watcher)
    }

    /// Set how long the loop waits for an event before checking whether it
    /// was cancelled. Bounds how long [`destroy`](Self::destroy) can take
    /// when no handler is running.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Register the directory with the event source and start the watch
    /// loop.
    ///
    /// Registration errors are returned here. Calling `init` more than once
    /// fails with [`WatcherError::InvalidState`].
    pub fn init(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != WatcherState::Created {
            return Err(WatcherError::InvalidState {
                operation: "init",
                state: lifecycle.state,
            });
        }

        let subscription = self.source.register(&self.path, self.kinds)?;
        let worker = WatchLoop {
            path: self.path.clone(),
            subscription,
            handlers: self.handlers.clone(),
            filter: self.filter.clone(),
            cancel: self.cancel.clone(),
            poll_interval: self.poll_interval,
            running: Arc::clone(&self.running),
        }
        .spawn()?;

        lifecycle.loop_thread = Some(worker.thread().id());
        lifecycle.state = WatcherState::Initialized;
        *self.worker.lock() = Some(worker);

        info!(path = %self.path.display(), kinds = ?self.kinds, "directory watcher initialized");
        Ok(())
    }

    /// Stop the watch loop and release the registration.
    ///
    /// Blocks until the loop thread has exited, so no handler runs after
    /// this returns. Calling it again is a no-op. When called from inside a
    /// handler the loop is cancelled but not joined; it exits once the
    /// current dispatch finishes.
    pub fn destroy(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != WatcherState::Destroyed {
                lifecycle.state = WatcherState::Destroyed;
                self.cancel.cancel();
            }
            if lifecycle.loop_thread == Some(thread::current().id()) {
                debug!(path = %self.path.display(), "destroy called from watch loop, not joining");
                return;
            }
        }

        let _join = self.join.lock();
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        match handle.join() {
            Ok(exit) => {
                info!(path = %self.path.display(), ?exit, "directory watcher destroyed");
            }
            Err(_) => {
                error!(path = %self.path.display(), "watch loop thread panicked");
            }
        }
    }

    /// Register a callback for every dispatched event.
    ///
    /// A callback added while an event is being dispatched may or may not
    /// see that event, but sees every later one.
    pub fn add_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&FileChangeEvent) + Send + Sync + 'static,
    {
        self.register(Callback(handler))
    }

    /// Register a callback whose errors are logged and otherwise ignored.
    pub fn add_fallible_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&FileChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(FallibleCallback(handler))
    }

    /// Register a [`Handler`] implementation.
    pub fn register(&self, handler: impl Handler + 'static) -> Result<()> {
        // Held across the push so a concurrent `destroy` cannot slip in
        // between the check and the append.
        let lifecycle = self.lifecycle.lock();
        if lifecycle.state == WatcherState::Destroyed {
            return Err(WatcherError::InvalidState {
                operation: "add handler",
                state: lifecycle.state,
            });
        }

        self.handlers.push(Arc::new(handler));
        Ok(())
    }

    /// Forward every dispatched event into a channel.
    ///
    /// Events sent after the receiver is dropped are discarded.
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_handler(move |event| {
            let _ = tx.send(event.clone());
        })?;
        Ok(rx)
    }

    /// The extension filter currently applied, if any.
    pub fn filename_extension_include(&self) -> Option<String> {
        self.filter.suffix()
    }

    /// Set or clear the extension filter.
    ///
    /// Takes effect from the next dispatched event.
    pub fn set_filename_extension_include(&self, suffix: Option<&str>) {
        self.filter.set_suffix(suffix.map(str::to_string));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        self.lifecycle.lock().state
    }

    /// Whether the watch loop thread is still running.
    ///
    /// Turns false after `destroy`, or earlier if the event source failed
    /// or ended.
    pub fn is_watching(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Canonical path of the watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kinds of change this watcher reports.
    pub fn kinds(&self) -> EventKinds {
        self.kinds
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .field("kinds", &self.kinds)
            .field("filter", &self.filter.suffix())
            .field("handlers", &self.handlers.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let (source, _sender) = MemorySource::new();
        let watcher =
            DirectoryWatcher::with_source(temp_dir.path(), ChangeKind::Created, source).unwrap();

        assert_eq!(watcher.state(), WatcherState::Created);
        assert_eq!(watcher.path(), temp_dir.path().canonicalize().unwrap());
        assert_eq!(watcher.kinds(), EventKinds::CREATED);
        assert!(!watcher.is_watching());
    }

    #[test]
    fn test_nonexistent_directory_is_rejected() {
        let result = DirectoryWatcher::new("/nonexistent/path/12345", EventKinds::all());
        assert!(matches!(result, Err(WatcherError::InvalidPath(_))));
    }

    #[test]
    fn test_file_path_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        std::fs::File::create(&file).unwrap();

        let result = DirectoryWatcher::new(&file, EventKinds::all());
        assert!(matches!(result, Err(WatcherError::InvalidPath(path)) if path == file));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let (source, sender) = MemorySource::new();
        let watcher =
            DirectoryWatcher::with_source(temp_dir.path(), EventKinds::all(), source).unwrap();

        watcher.init().unwrap();
        assert_eq!(watcher.state(), WatcherState::Initialized);
        assert_eq!(sender.active_subscriptions(), 1);
        assert!(matches!(
            watcher.init(),
            Err(WatcherError::InvalidState { operation: "init", .. })
        ));

        watcher.destroy();
        assert_eq!(watcher.state(), WatcherState::Destroyed);
        assert_eq!(sender.active_subscriptions(), 0);
        assert!(!watcher.is_watching());

        watcher.destroy();
        assert!(matches!(
            watcher.add_handler(|_| {}),
            Err(WatcherError::InvalidState { .. })
        ));
        assert_eq!(watcher.handler_count(), 0);
    }

    #[test]
    fn test_destroy_without_init() {
        let temp_dir = TempDir::new().unwrap();
        let (source, sender) = MemorySource::new();
        let watcher =
            DirectoryWatcher::with_source(temp_dir.path(), EventKinds::all(), source).unwrap();

        watcher.destroy();

        assert_eq!(watcher.state(), WatcherState::Destroyed);
        assert_eq!(sender.active_subscriptions(), 0);
        assert!(watcher.init().is_err());
    }

    #[test]
    fn test_config_sets_filter() {
        let temp_dir = TempDir::new().unwrap();
        let (source, _sender) = MemorySource::new();
        let config = WatcherConfig::new(temp_dir.path())
            .with_kinds([ChangeKind::Modified])
            .with_extension(".json");

        let watcher = DirectoryWatcher::from_config_with_source(&config, source).unwrap();

        assert_eq!(watcher.kinds(), EventKinds::MODIFIED);
        assert_eq!(watcher.filename_extension_include().as_deref(), Some(".json"));

        watcher.set_filename_extension_include(None);
        assert_eq!(watcher.filename_extension_include(), None);
    }
}
