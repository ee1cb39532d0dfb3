// src/listeners/mod.rs
//! Watch listeners: console status lines, a JSON-lines event file and the
//! Google sync queue

pub mod sync_queue;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::core::watcher_types::{ImageSavedEvent, WatchListener};

pub use sync_queue::{spawn_sync_worker, SyncQueue, SyncStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable status lines
    Human,
    /// One JSON object per line
    Json,
}

fn saved_json(event: &ImageSavedEvent) -> serde_json::Value {
    serde_json::json!({
        "event_type": "image_saved",
        "timestamp": event.saved_at.to_rfc3339(),
        "session_count": event.session_count,
        "image": {
            "index": event.image.index,
            "file_name": event.image.file_name,
            "path": event.image.path.display().to_string(),
            "width": event.image.width,
            "height": event.image.height,
        },
    })
}

fn lifecycle_json(event_type: &str, extra: serde_json::Value) -> serde_json::Value {
    let mut value = serde_json::json!({
        "event_type": event_type,
        "timestamp": chrono::Local::now().to_rfc3339(),
    });
    if let (Some(map), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
        map.extend(extra);
    }
    value
}

/// Prints status lines to stdout
pub struct ConsoleReporter {
    format: OutputFormat,
}

impl ConsoleReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl WatchListener for ConsoleReporter {
    fn on_image_saved(&mut self, event: &ImageSavedEvent) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "📸 #{} Saved: {} ({}x{})",
                    event.session_count,
                    event.image.file_name,
                    event.image.width,
                    event.image.height
                );
            }
            OutputFormat::Json => println!("{}", saved_json(event)),
        }
    }

    fn on_save_failed(&mut self, error: &str) {
        match self.format {
            OutputFormat::Human => println!("❌ Save error (see log): {}", error),
            OutputFormat::Json => println!(
                "{}",
                lifecycle_json("save_failed", serde_json::json!({ "error": error }))
            ),
        }
    }

    fn on_monitoring_started(&mut self, folder: &Path) {
        match self.format {
            OutputFormat::Human => {
                println!("🚀 Running: watching clipboard… saving into {}", folder.display());
                println!("   Press Ctrl+C to stop.");
            }
            OutputFormat::Json => println!(
                "{}",
                lifecycle_json(
                    "monitoring_started",
                    serde_json::json!({ "folder": folder.display().to_string() })
                )
            ),
        }
    }

    fn on_monitoring_stopped(&mut self, saved: u64) {
        match self.format {
            OutputFormat::Human => println!("🛑 Stopped. {} image(s) saved.", saved),
            OutputFormat::Json => println!(
                "{}",
                lifecycle_json("monitoring_stopped", serde_json::json!({ "saved": saved }))
            ),
        }
    }
}

/// Appends every event to a JSON-lines file
pub struct FileEventLogger {
    path: PathBuf,
    file: File,
}

impl FileEventLogger {
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    fn write(&mut self, value: &serde_json::Value) {
        if let Err(e) = writeln!(self.file, "{}", value) {
            error!("Failed to write to {}: {}", self.path.display(), e);
        }
    }
}

impl WatchListener for FileEventLogger {
    fn on_image_saved(&mut self, event: &ImageSavedEvent) {
        self.write(&saved_json(event));
    }

    fn on_save_failed(&mut self, error: &str) {
        self.write(&lifecycle_json(
            "save_failed",
            serde_json::json!({ "error": error }),
        ));
    }

    fn on_monitoring_started(&mut self, folder: &Path) {
        self.write(&lifecycle_json(
            "monitoring_started",
            serde_json::json!({ "folder": folder.display().to_string() }),
        ));
    }

    fn on_monitoring_stopped(&mut self, saved: u64) {
        self.write(&lifecycle_json(
            "monitoring_stopped",
            serde_json::json!({ "saved": saved }),
        ));
    }
}
