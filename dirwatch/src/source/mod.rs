//! Raw event sources.
//!
//! A source turns a directory registration into a stream of [`RawEvent`]s.
//! The watch loop only ever talks to these traits, so the OS facility can
//! be swapped for [`MemorySource`] in tests.

mod memory;
mod native;

use std::path::Path;
use std::time::Duration;

pub use memory::{MemorySender, MemorySource};
pub use native::NotifySource;

use crate::error::Result;
use crate::event::{EventKinds, RawEvent};

/// Facility that can watch a directory for changes.
pub trait EventSource: Send + Sync {
    /// Register `path` for the given kinds.
    ///
    /// The returned subscription holds the underlying OS resource until it
    /// is closed or dropped.
    fn register(&self, path: &Path, kinds: EventKinds) -> Result<Box<dyn EventSubscription>>;
}

/// Outcome of waiting on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextEvent {
    /// A change was reported.
    Event(RawEvent),

    /// Nothing arrived before the timeout.
    Idle,

    /// The stream ended; no more events will arrive.
    Closed,
}

/// A live registration with an event source.
pub trait EventSubscription: Send {
    /// Wait up to `timeout` for the next event.
    ///
    /// An `Err` means the source is broken and the caller should stop
    /// polling.
    fn next_event(&mut self, timeout: Duration) -> Result<NextEvent>;

    /// Release the registration. Further calls to `next_event` return
    /// [`NextEvent::Closed`].
    fn close(&mut self) -> Result<()>;
}
