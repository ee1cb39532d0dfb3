// src/core/mod.rs
//! Clipboard polling, file naming and image persistence

pub mod clipboard;
pub mod naming;
pub mod shutdown;
pub mod storage;
pub mod watcher;
pub mod watcher_types;

pub use clipboard::{ClipboardError, ClipboardImage, ClipboardSource, SystemClipboard};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use storage::{ImageFolder, SavedImage, StorageError};
pub use watcher::{ClipboardWatcher, PollOutcome};
pub use watcher_types::{ImageSavedEvent, WatchListener, WatcherConfig, DEFAULT_POLL_INTERVAL};
