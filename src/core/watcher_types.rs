// src/core/watcher_types.rs
//! Common types and traits for clipboard watch events

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use super::storage::SavedImage;

/// Default delay between two clipboard reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub folder: PathBuf,
    pub poll_interval: Duration,
}

impl WatcherConfig {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// A new clipboard image was written to disk
#[derive(Debug, Clone)]
pub struct ImageSavedEvent {
    pub timestamp: Instant,
    pub saved_at: DateTime<Local>,
    pub image: SavedImage,
    /// How many images this session has saved, including this one
    pub session_count: u64,
}

impl ImageSavedEvent {
    pub fn new(image: SavedImage, session_count: u64) -> Self {
        Self {
            timestamp: Instant::now(),
            saved_at: Local::now(),
            image,
            session_count,
        }
    }
}

/// Trait for watch event listeners
pub trait WatchListener: Send {
    /// Called after a new image has been saved
    fn on_image_saved(&mut self, event: &ImageSavedEvent);

    /// Called when a detected image could not be saved
    fn on_save_failed(&mut self, _error: &str) {}

    /// Called when monitoring starts
    fn on_monitoring_started(&mut self, _folder: &std::path::Path) {}

    /// Called when monitoring stops
    fn on_monitoring_stopped(&mut self, _saved: u64) {}
}
