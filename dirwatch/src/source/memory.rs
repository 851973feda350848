//! In-memory event source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::{EventSource, EventSubscription, NextEvent};
use crate::error::{Result, WatcherError};
use crate::event::{ChangeKind, EventKinds, RawEvent};

enum Message {
    Event(RawEvent),
    Fail(String),
    End,
}

/// Event source fed by a [`MemorySender`] instead of the filesystem.
///
/// Events whose kind was not registered are dropped, as an OS facility
/// would. Useful for driving a watcher deterministically in tests.
#[derive(Debug)]
pub struct MemorySource {
    messages: Receiver<Message>,
    active: Arc<AtomicUsize>,
}

/// Feeds events into a [`MemorySource`].
#[derive(Debug, Clone)]
pub struct MemorySender {
    messages: Sender<Message>,
    active: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Create a source and the sender that feeds it.
    pub fn new() -> (Self, MemorySender) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let active = Arc::new(AtomicUsize::new(0));

        let source = Self {
            messages: rx,
            active: Arc::clone(&active),
        };
        let sender = MemorySender {
            messages: tx,
            active,
        };
        (source, sender)
    }
}

impl MemorySender {
    /// Report a change to `file_name`.
    pub fn emit(&self, kind: ChangeKind, file_name: impl Into<PathBuf>) {
        self.send(Message::Event(RawEvent::new(kind, file_name)));
    }

    /// Make the next poll fail with `message`.
    pub fn fail(&self, message: impl Into<String>) {
        self.send(Message::Fail(message.into()));
    }

    /// End the stream.
    pub fn end(&self) {
        self.send(Message::End);
    }

    /// Number of registrations not yet closed.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) {
        // Only fails once every receiver is gone, at which point nobody
        // is listening anyway.
        let _ = self.messages.send(message);
    }
}

impl EventSource for MemorySource {
    fn register(&self, _path: &Path, kinds: EventKinds) -> Result<Box<dyn EventSubscription>> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySubscription {
            messages: Some(self.messages.clone()),
            kinds,
            active: Arc::clone(&self.active),
        }))
    }
}

struct MemorySubscription {
    messages: Option<Receiver<Message>>,
    kinds: EventKinds,
    active: Arc<AtomicUsize>,
}

impl EventSubscription for MemorySubscription {
    fn next_event(&mut self, timeout: Duration) -> Result<NextEvent> {
        let Some(messages) = &self.messages else {
            return Ok(NextEvent::Closed);
        };

        match messages.recv_timeout(timeout) {
            Ok(Message::Event(event)) if self.kinds.includes(event.kind) => {
                Ok(NextEvent::Event(event))
            }
            Ok(Message::Event(_)) | Err(RecvTimeoutError::Timeout) => Ok(NextEvent::Idle),
            Ok(Message::Fail(message)) => Err(WatcherError::Source(message)),
            Ok(Message::End) | Err(RecvTimeoutError::Disconnected) => Ok(NextEvent::Closed),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.messages.take().is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
