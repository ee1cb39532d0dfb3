// src/google/sync.rs
//! Upload a saved image to Drive and embed it into the matching sheet cell

use std::path::Path;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::auth::GoogleAuth;
use super::drive::{self, DriveClient};
use super::sheets::{self, SheetsClient};
use super::SyncError;
use crate::config::SHEET_SCAN_RANGE;
use crate::settings::GoogleSyncSettings;

/// Where an image ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoogleSyncResult {
    pub cell: String,
    pub file_id: String,
    pub link: String,
}

pub struct GoogleSheetSync {
    settings: GoogleSyncSettings,
    auth: GoogleAuth,
    drive: DriveClient,
    sheets: SheetsClient,
}

impl GoogleSheetSync {
    /// Authenticate and get ready to sync. Fails when sync is disabled.
    pub async fn new(settings: GoogleSyncSettings) -> Result<Self, SyncError> {
        let client = Client::new();
        let drive = DriveClient::new(client.clone());
        let sheets = SheetsClient::new(client.clone());
        Self::with_clients(settings, client, drive, sheets).await
    }

    /// Like `new`, with the Drive and Sheets clients supplied by the caller
    pub async fn with_clients(
        settings: GoogleSyncSettings,
        client: Client,
        drive: DriveClient,
        sheets: SheetsClient,
    ) -> Result<Self, SyncError> {
        if !settings.enabled {
            return Err(SyncError::Disabled);
        }
        if settings.spreadsheet_id.is_empty() {
            return Err(SyncError::MissingSetting("spreadsheet_id"));
        }

        let auth = GoogleAuth::from_settings(&settings, client).await?;
        info!(
            "Google Sheets sync ready (spreadsheet {}, sheet {}, search '{}')",
            settings.spreadsheet_id, settings.sheet_name, settings.search_term
        );

        Ok(Self {
            settings,
            auth,
            drive,
            sheets,
        })
    }

    /// Upload `image_path`, locate the cell containing the search term and
    /// point it at the uploaded image
    pub async fn upload_and_update(&self, image_path: &Path) -> Result<GoogleSyncResult, SyncError> {
        let token = self.auth.access_token().await?;

        let file_id = self
            .drive
            .upload_png(&token, image_path, self.settings.drive_folder_id.as_deref())
            .await?;

        // A shared parent folder may already grant access, or forbid "anyone"
        // permissions; the upload stands either way.
        if let Err(e) = self.drive.share_publicly(&token, &file_id).await {
            debug!("could not make {} public: {}", file_id, e);
        }

        let link = drive::view_link(&file_id);
        let cell = self.find_target_cell(&token).await?;
        self.sheets
            .update_cell(
                &token,
                &self.settings.spreadsheet_id,
                &cell,
                &sheets::image_formula(&link),
            )
            .await?;

        Ok(GoogleSyncResult {
            cell,
            file_id,
            link,
        })
    }

    async fn find_target_cell(&self, token: &str) -> Result<String, SyncError> {
        let range = format!("{}!{}", self.settings.sheet_name, SHEET_SCAN_RANGE);
        let values = self
            .sheets
            .get_values(token, &self.settings.spreadsheet_id, &range)
            .await?;

        sheets::find_cell(&values, &self.settings.search_term, &self.settings.sheet_name).ok_or_else(
            || SyncError::CellNotFound {
                term: self.settings.search_term.clone(),
                sheet: self.settings.sheet_name.clone(),
            },
        )
    }
}
