// src/core/watcher.rs
//! The clipboard poll loop
//!
//! One loop reads the clipboard every `poll_interval`, compares the image
//! with the last one it has seen and saves it when it changed. Listeners are
//! told about every save and every failure; neither ever stops the loop.
//! Each poll runs on the blocking pool: clipboard reads, PNG encoding and file
//! writes would otherwise stall the runtime.

use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::clipboard::{ClipboardImage, ClipboardSource};
use super::shutdown::ShutdownToken;
use super::storage::{ImageFolder, SavedImage, StorageError};
use super::watcher_types::{ImageSavedEvent, WatchListener, WatcherConfig};

/// What a single poll did
#[derive(Debug)]
pub enum PollOutcome {
    /// Clipboard holds no image
    NoImage,
    /// Same image as last time
    Unchanged,
    /// A new image was written
    Saved(SavedImage),
    /// A new image was found but could not be written
    SaveFailed(String),
    /// The clipboard could not be read this tick
    ReadFailed(String),
}

pub struct ClipboardWatcher<S: ClipboardSource> {
    source: S,
    folder: ImageFolder,
    config: WatcherConfig,
    listeners: Vec<Box<dyn WatchListener>>,
    last_image: Option<ClipboardImage>,
    running: bool,
    saved_count: u64,
}

impl<S: ClipboardSource> ClipboardWatcher<S> {
    /// Create a watcher; the save folder is created when missing
    pub fn new(source: S, config: WatcherConfig) -> Result<Self, StorageError> {
        let folder = ImageFolder::open(&config.folder)?;
        Ok(Self {
            source,
            folder,
            config,
            listeners: Vec::new(),
            last_image: None,
            running: false,
            saved_count: 0,
        })
    }

    /// Add a listener for watch events
    pub fn add_listener<T: WatchListener + 'static>(&mut self, listener: T) {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn saved_count(&self) -> u64 {
        self.saved_count
    }

    /// Start monitoring. Whatever image is on the clipboard right now becomes
    /// the baseline, so it is not saved. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.saved_count = 0;
        self.last_image = self.source.signature();

        info!("=== START === watching clipboard, saving into {}", self.folder.path().display());
        if let Some(baseline) = &self.last_image {
            debug!("baseline clipboard image: {}", baseline);
        }
        for listener in &mut self.listeners {
            listener.on_monitoring_started(self.folder.path());
        }
        true
    }

    /// Stop monitoring. Calling it twice is harmless.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        info!("=== STOP === {} image(s) saved", self.saved_count);
        for listener in &mut self.listeners {
            listener.on_monitoring_stopped(self.saved_count);
        }
    }

    /// Read the clipboard once and save the image if it is new
    pub fn poll_once(&mut self) -> PollOutcome {
        let image = match self.source.read_image() {
            Ok(Some(image)) => image,
            Ok(None) => return PollOutcome::NoImage,
            Err(e) => {
                warn!("Clipboard access error: {}", e);
                return PollOutcome::ReadFailed(e.to_string());
            }
        };

        if self
            .last_image
            .as_ref()
            .is_some_and(|last| last.same_content(&image))
        {
            return PollOutcome::Unchanged;
        }

        // A failed image still counts as seen; it is reported once.
        let saved = self.folder.save(&image);
        self.last_image = Some(image);

        match saved {
            Ok(saved) => {
                self.saved_count += 1;
                info!("Saved: {}", saved.path.display());

                let event = ImageSavedEvent::new(saved.clone(), self.saved_count);
                for listener in &mut self.listeners {
                    listener.on_image_saved(&event);
                }
                PollOutcome::Saved(saved)
            }
            Err(e) => {
                error!("Save error: {}", e);
                let message = e.to_string();
                for listener in &mut self.listeners {
                    listener.on_save_failed(&message);
                }
                PollOutcome::SaveFailed(message)
            }
        }
    }

    /// Poll until `shutdown` fires, then stop and hand the watcher back.
    /// Fails only if a poll panicked.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<Self, JoinError>
    where
        S: 'static,
    {
        self.start();

        while !shutdown.is_shutdown() {
            self = tokio::task::spawn_blocking(move || {
                self.poll_once();
                self
            })
            .await?;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        self.stop();
        Ok(self)
    }
}
