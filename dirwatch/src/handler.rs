//! Handler registry and per-handler failure isolation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::event::FileChangeEvent;

/// Receives file change events from a watcher.
///
/// Handlers run on the watch loop thread, one at a time, in registration
/// order. A handler that returns an error or panics is logged and skipped;
/// it does not stop the loop or the handlers after it.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &FileChangeEvent) -> anyhow::Result<()>;
}

/// Adapts a plain callback into a [`Handler`].
pub struct Callback<F>(pub F);

impl<F> Handler for Callback<F>
where
    F: Fn(&FileChangeEvent) + Send + Sync,
{
    fn handle(&self, event: &FileChangeEvent) -> anyhow::Result<()> {
        (self.0)(event);
        Ok(())
    }
}

/// Adapts a callback returning `anyhow::Result` into a [`Handler`].
pub struct FallibleCallback<F>(pub F);

impl<F> Handler for FallibleCallback<F>
where
    F: Fn(&FileChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &FileChangeEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

type HandlerList = Vec<Arc<dyn Handler>>;

/// Append-only, ordered collection of handlers.
///
/// Readers take an `Arc` snapshot and release the lock before invoking
/// anything, so a handler may register further handlers from inside its
/// callback. Appends copy the list only while a snapshot is outstanding.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<Arc<HandlerList>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn push(&self, handler: Arc<dyn Handler>) {
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut *handlers).push(handler);
    }

    /// The handlers registered so far, in order.
    pub fn snapshot(&self) -> Arc<HandlerList> {
        Arc::clone(&*self.handlers.read())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invoke every handler with `event`, isolating failures.
    pub fn dispatch(&self, event: &FileChangeEvent) -> DispatchReport {
        let handlers = self.snapshot();
        let mut report = DispatchReport::default();

        for (index, handler) in handlers.iter().enumerate() {
            report.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(
                        handler = index,
                        file = %event.file_name.display(),
                        "handler failed: {err:#}"
                    );
                }
                Err(payload) => {
                    report.failed += 1;
                    warn!(
                        handler = index,
                        file = %event.file_name.display(),
                        "handler panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers invoked.
    pub invoked: usize,

    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
