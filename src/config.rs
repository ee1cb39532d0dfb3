// src/config.rs
//! Application constants

use std::time::Duration;

pub const APP_NAME: &str = "Clipboard Image Saver";

/// Clipboard poll interval used when none is given
pub const POLL_INTERVAL: Duration = crate::core::DEFAULT_POLL_INTERVAL;

/// Where the Google sync settings live unless `--settings` says otherwise
pub const GOOGLE_SETTINGS_FILE: &str = "google_sync_settings.json";

/// Default OAuth token cache
pub const DEFAULT_TOKEN_FILE: &str = "google_token.json";

pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_SEARCH_TERM: &str = "add";

/// Block of cells scanned for the search term
pub const SHEET_SCAN_RANGE: &str = "A1:Z200";

/// OAuth scopes requested for Drive uploads and Sheets edits
pub const GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];
