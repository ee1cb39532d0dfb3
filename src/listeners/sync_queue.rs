// src/listeners/sync_queue.rs
//! Hands saved images to the Google sync worker
//!
//! The poll loop never waits on the network: saved paths go through an
//! unbounded channel to a single worker task that uploads them in order.
//! The worker authenticates in the background, so images saved before it is
//! ready are queued rather than skipped.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::watcher_types::{ImageSavedEvent, WatchListener};
use crate::google::{GoogleSheetSync, GoogleSyncResult, SyncError};
use crate::settings::GoogleSyncSettings;

/// Totals reported by the worker when its queue closes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub uploaded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Listener side of the queue
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl WatchListener for SyncQueue {
    fn on_image_saved(&mut self, event: &ImageSavedEvent) {
        if self.tx.send(event.image.path.clone()).is_err() {
            debug!("sync worker is gone, not queueing {}", event.image.file_name);
        }
    }
}

/// Something that can push one image to the cloud
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, path: &std::path::Path) -> Result<GoogleSyncResult, SyncError>;
}

#[async_trait]
impl ImageUploader for GoogleSheetSync {
    async fn upload(&self, path: &std::path::Path) -> Result<GoogleSyncResult, SyncError> {
        self.upload_and_update(path).await
    }
}

/// Start the worker. It ends once every `SyncQueue` has been dropped and the
/// queue is drained.
pub fn spawn_sync_worker(settings: GoogleSyncSettings) -> (SyncQueue, JoinHandle<SyncStats>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let sync = connect(settings).await;
        drain(sync.as_ref(), rx).await
    });
    (SyncQueue { tx }, handle)
}

async fn connect(settings: GoogleSyncSettings) -> Option<GoogleSheetSync> {
    if !settings.enabled {
        info!("Google Sheets sync disabled (toggle is off).");
        return None;
    }
    match GoogleSheetSync::new(settings).await {
        Ok(sync) => {
            info!("Google Sheets sync enabled.");
            Some(sync)
        }
        Err(e) => {
            warn!("Google Sheets sync not started: {}", e);
            None
        }
    }
}

async fn drain<U: ImageUploader>(
    uploader: Option<&U>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
) -> SyncStats {
    let mut stats = SyncStats::default();
    while let Some(path) = rx.recv().await {
        let Some(uploader) = uploader else {
            stats.skipped += 1;
            continue;
        };
        match uploader.upload(&path).await {
            Ok(result) => {
                stats.uploaded += 1;
                info!("Uploaded to Sheets ({}) via {}", result.cell, result.link);
            }
            Err(e) => {
                stats.failed += 1;
                error!("Google sync error for {}: {}", path.display(), e);
            }
        }
    }
    stats
}
