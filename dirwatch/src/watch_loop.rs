//! The background loop that polls a subscription and dispatches events.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WatcherError};
use crate::event::{FileChangeEvent, RawEvent};
use crate::filter::ExtensionFilter;
use crate::handler::HandlerRegistry;
use crate::source::{EventSubscription, NextEvent};

const THREAD_NAME: &str = "dirwatch-loop";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    Cancelled,
    EndOfStream,
    SourceFailed,
}

pub(crate) struct WatchLoop {
    pub(crate) path: PathBuf,
    pub(crate) subscription: Box<dyn EventSubscription>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) filter: ExtensionFilter,
    pub(crate) cancel: CancellationToken,
    pub(crate) poll_interval: Duration,

    /// Cleared when the loop thread exits, however it exits.
    pub(crate) running: Arc<AtomicBool>,
}

/// Clears the running flag when the loop thread exits, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl WatchLoop {
    /// Run the loop on a dedicated thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<LoopExit>> {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(|err| {
                running.store(false, Ordering::SeqCst);
                WatcherError::ThreadSpawn(err)
            })
    }

    /// Poll until cancelled, the stream ends, or the source fails.
    ///
    /// Cancellation is checked between events only; a handler that is
    /// already running is never interrupted. The subscription is closed
    /// before returning.
    pub(crate) fn run(mut self) -> LoopExit {
        let _running = RunningGuard(Arc::clone(&self.running));
        info!(path = %self.path.display(), "watch loop started");

        let exit = loop {
            if self.cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }

            match self.subscription.next_event(self.poll_interval) {
                Ok(NextEvent::Event(raw)) => {
                    if self.cancel.is_cancelled() {
                        break LoopExit::Cancelled;
                    }
                    self.dispatch(raw);
                }
                Ok(NextEvent::Idle) => {}
                Ok(NextEvent::Closed) => break LoopExit::EndOfStream,
                Err(err) => {
                    error!(path = %self.path.display(), "event source failed, stopping watch loop: {err}");
                    break LoopExit::SourceFailed;
                }
            }
        };

        if let Err(err) = self.subscription.close() {
            warn!(path = %self.path.display(), "failed to release watch: {err}");
        }
        info!(path = %self.path.display(), ?exit, "watch loop stopped");
        exit
    }

    fn dispatch(&self, raw: RawEvent) {
        let event = FileChangeEvent::from(raw);

        if !self.filter.matches(&event.file_name) {
            debug!(file = %event.file_name.display(), kind = %event.kind, "filtered out");
            return;
        }

        let report = self.handlers.dispatch(&event);
        debug!(
            file = %event.file_name.display(),
            kind = %event.kind,
            invoked = report.invoked,
            failed = report.failed,
            "dispatched"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeKind, EventKinds};
    use crate::handler::Callback;
    use crate::source::{EventSource, MemorySender, MemorySource};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn watch_loop(kinds: EventKinds) -> (WatchLoop, MemorySender, Arc<Mutex<Vec<String>>>) {
        let (source, sender) = MemorySource::new();
        let subscription = source.register(Path::new("/watched"), kinds).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = HandlerRegistry::new();
        let sink = Arc::clone(&seen);
        handlers.push(Arc::new(Callback(move |event: &FileChangeEvent| {
            sink.lock().push(event.file_name.display().to_string());
        })));

        let watch_loop = WatchLoop {
            path: PathBuf::from("/watched"),
            subscription,
            handlers,
            filter: ExtensionFilter::default(),
            cancel: CancellationToken::new(),
            poll_interval: Duration::from_millis(10),
            running: Arc::new(AtomicBool::new(false)),
        };
        (watch_loop, sender, seen)
    }

    #[test]
    fn test_dispatches_in_source_order_until_end_of_stream() {
        let (watch_loop, sender, seen) = watch_loop(EventKinds::all());
        sender.emit(ChangeKind::Created, "x");
        sender.emit(ChangeKind::Modified, "y");
        sender.end();

        assert_eq!(watch_loop.run(), LoopExit::EndOfStream);
        assert_eq!(*seen.lock(), vec!["x", "y"]);
        assert_eq!(sender.active_subscriptions(), 0);
    }

    #[test]
    fn test_source_failure_is_fatal() {
        let (watch_loop, sender, seen) = watch_loop(EventKinds::all());
        sender.emit(ChangeKind::Created, "before");
        sender.fail("inotify queue overflow");
        sender.emit(ChangeKind::Created, "after");

        assert_eq!(watch_loop.run(), LoopExit::SourceFailed);
        assert_eq!(*seen.lock(), vec!["before"]);
        assert_eq!(sender.active_subscriptions(), 0);
    }

    #[test]
    fn test_filter_applies_per_event() {
        let (watch_loop, sender, seen) = watch_loop(EventKinds::all());
        watch_loop.filter.set_suffix(Some(".json".to_string()));
        sender.emit(ChangeKind::Created, "testCreate");
        sender.emit(ChangeKind::Created, "testCreate.json");
        sender.end();

        watch_loop.run();
        assert_eq!(*seen.lock(), vec!["testCreate.json"]);
    }

    #[test]
    fn test_cancelled_loop_dispatches_nothing() {
        let (watch_loop, sender, seen) = watch_loop(EventKinds::all());
        watch_loop.cancel.cancel();
        sender.emit(ChangeKind::Created, "x");

        assert_eq!(watch_loop.run(), LoopExit::Cancelled);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_spawned_loop_stops_on_cancel() {
        let (watch_loop, sender, _seen) = watch_loop(EventKinds::all());
        let cancel = watch_loop.cancel.clone();
        let running = Arc::clone(&watch_loop.running);

        let handle = watch_loop.spawn().unwrap();
        assert!(running.load(Ordering::SeqCst));
        cancel.cancel();

        assert_eq!(handle.join().unwrap(), LoopExit::Cancelled);
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(sender.active_subscriptions(), 0);
    }
}
