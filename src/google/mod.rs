// src/google/mod.rs
//! Optional Google Drive + Sheets sync
//!
//! Every saved image can be uploaded to Drive and embedded into the first
//! spreadsheet cell that contains a search term, as an `=IMAGE(...)` formula.
//!
//! Two ways to authenticate, picked by `GoogleSyncSettings::auth_mode`:
//! - service account: a JSON key; share the sheet (and Drive folder) with
//!   the service account email
//! - user OAuth: an installed-app client secret; the first run opens the
//!   consent page and caches the resulting token file

pub mod auth;
pub mod drive;
pub mod redirect;
pub mod sheets;
pub mod sync;

#[cfg(test)]
mod fake_api;

use std::path::PathBuf;

use thiserror::Error;

pub use auth::GoogleAuth;
pub use sync::{GoogleSheetSync, GoogleSyncResult};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Google sync is disabled (toggle is off)")]
    Disabled,

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("{what} not found: {path}")]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not sign token request: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("{api} API error ({status}): {body}")]
    Api {
        api: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("OAuth flow failed: {0}")]
    OAuth(String),

    #[error("No cell containing '{term}' found in sheet {sheet}")]
    CellNotFound { term: String, sheet: String },
}

/// Turn a non-2xx response into `SyncError::Api`
pub(crate) async fn check_response(
    api: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SyncError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Api { api, status, body })
}
