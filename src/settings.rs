// src/settings.rs
//! Google sync settings, persisted as JSON next to the binary
//!
//! A missing or unreadable file means "sync disabled with defaults"; the
//! watcher never refuses to start because of these settings.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{DEFAULT_SEARCH_TERM, DEFAULT_SHEET_NAME, DEFAULT_TOKEN_FILE};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How the app authenticates against Google
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Service account JSON key
    #[default]
    Service,
    /// Installed-app OAuth on behalf of a user
    #[value(name = "oauth")]
    OAuth,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Service => f.write_str("service"),
            AuthMode::OAuth => f.write_str("oauth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSyncSettings {
    pub enabled: bool,
    pub auth_mode: AuthMode,
    pub credentials_file: String,
    pub client_secret_file: String,
    pub token_file: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub search_term: String,
    pub drive_folder_id: Option<String>,
}

impl Default for GoogleSyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_mode: AuthMode::Service,
            credentials_file: String::new(),
            client_secret_file: String::new(),
            token_file: DEFAULT_TOKEN_FILE.to_string(),
            spreadsheet_id: String::new(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            search_term: DEFAULT_SEARCH_TERM.to_string(),
            drive_folder_id: None,
        }
    }
}

/// Partial edit of the settings; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub auth_mode: Option<AuthMode>,
    pub credentials_file: Option<String>,
    pub client_secret_file: Option<String>,
    pub token_file: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub search_term: Option<String>,
    pub drive_folder_id: Option<String>,
}

impl GoogleSyncSettings {
    /// Read settings, reporting every problem
    pub fn try_load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read settings, falling back to defaults when the file is absent or broken
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(SettingsError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("no settings file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, creating parent folders
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Apply an edit. Text fields are trimmed; a blank token file, sheet name
    /// or search term falls back to its default and a blank Drive folder
    /// clears it.
    pub fn apply(&mut self, update: SettingsUpdate) {
        fn trimmed(value: String) -> String {
            value.trim().to_string()
        }
        fn or_default(value: String, default: &str) -> String {
            let value = trimmed(value);
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        }

        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(mode) = update.auth_mode {
            self.auth_mode = mode;
        }
        if let Some(v) = update.credentials_file {
            self.credentials_file = trimmed(v);
        }
        if let Some(v) = update.client_secret_file {
            self.client_secret_file = trimmed(v);
        }
        if let Some(v) = update.token_file {
            self.token_file = or_default(v, DEFAULT_TOKEN_FILE);
        }
        if let Some(v) = update.spreadsheet_id {
            self.spreadsheet_id = trimmed(v);
        }
        if let Some(v) = update.sheet_name {
            self.sheet_name = or_default(v, DEFAULT_SHEET_NAME);
        }
        if let Some(v) = update.search_term {
            self.search_term = or_default(v, DEFAULT_SEARCH_TERM);
        }
        if let Some(v) = update.drive_folder_id {
            let v = trimmed(v);
            self.drive_folder_id = if v.is_empty() { None } else { Some(v) };
        }
    }
}
