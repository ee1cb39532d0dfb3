//! Clipboard Image Saver Library
//!
//! Watches the system clipboard, saves every new image as a sequentially
//! numbered PNG, and can optionally push each saved image to Google Drive
//! and embed it into a Google Sheets cell.

pub mod config;
pub mod core;
pub mod google;
pub mod listeners;
pub mod settings;

pub use crate::core::{
    ClipboardImage, ClipboardSource, ClipboardWatcher, ImageFolder, ImageSavedEvent,
    SavedImage, SystemClipboard, WatchListener, WatcherConfig,
};
pub use settings::{AuthMode, GoogleSyncSettings};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::core::{
        shutdown_channel, ClipboardImage, ClipboardSource, ClipboardWatcher, ImageSavedEvent,
        WatchListener, WatcherConfig,
    };
    pub use crate::google::{GoogleSheetSync, GoogleSyncResult};
    pub use crate::listeners::{ConsoleReporter, FileEventLogger, OutputFormat};
    pub use crate::settings::GoogleSyncSettings;
}
