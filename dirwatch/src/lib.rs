//! # Directory Watcher
//!
//! Watches a single directory for created, modified and deleted files and
//! dispatches each change to registered handlers, optionally restricted to
//! file names with a given suffix.
//!
//! ## Features
//!
//! - **Native Watching**: Events come from the platform watcher via `notify`
//! - **Extension Filter**: Dispatch only names ending in e.g. `.json`
//! - **Ordered Dispatch**: Handlers run in registration order, events in source order
//! - **Failure Isolation**: A failing handler never stops the others or the loop
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EventSource ──► WatchLoop ──► ExtensionFilter ──► Handlers    │
//! │       │              │                                 │        │
//! │       ▼              ▼                                 ▼        │
//! │  RawEvent     CancellationToken              FileChangeEvent    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod source;
mod watch_loop;
pub mod watcher;

pub use config::WatcherConfig;
pub use error::{Result, WatcherError};
pub use event::{ChangeKind, EventKinds, FileChangeEvent, RawEvent};
pub use filter::ExtensionFilter;
pub use handler::{Handler, HandlerRegistry};
pub use source::{EventSource, EventSubscription, MemorySender, MemorySource, NextEvent, NotifySource};
pub use watcher::{DirectoryWatcher, WatcherState};
