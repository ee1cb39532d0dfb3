// src/google/drive.rs
//! Drive v3: multipart upload and public-read permission

use std::path::Path;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_response, SyncError};

const GOOGLE_APIS_URL: &str = "https://www.googleapis.com";
const BOUNDARY: &str = "clipboard_image_saver_boundary";

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Direct view link used inside the `=IMAGE()` formula
pub fn view_link(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={}", file_id)
}

/// Body of a `multipart/related` upload: JSON metadata, then the file bytes
pub fn multipart_body(metadata: &serde_json::Value, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// File metadata; the parent folder is only set when configured
pub fn file_metadata(name: &str, folder_id: Option<&str>) -> serde_json::Value {
    match folder_id {
        Some(folder) => json!({ "name": name, "parents": [folder] }),
        None => json!({ "name": name }),
    }
}

pub struct DriveClient {
    client: Client,
    upload_url: String,
    files_url: String,
}

impl DriveClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GOOGLE_APIS_URL)
    }

    /// Talk to `base_url` instead of `www.googleapis.com`
    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client,
            upload_url: format!("{}/upload/drive/v3/files", base),
            files_url: format!("{}/drive/v3/files", base),
        }
    }

    /// Upload a PNG and return its file id
    pub async fn upload_png(
        &self,
        token: &str,
        path: &Path,
        folder_id: Option<&str>,
    ) -> Result<String, SyncError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());

        let body = multipart_body(&file_metadata(&name, folder_id), "image/png", &bytes);

        debug!("uploading {} ({} bytes) to Drive", name, bytes.len());
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await?;

        let created: CreatedFile = check_response("Drive", response).await?.json().await?;
        Ok(created.id)
    }

    /// Make the file readable by anyone with the link
    pub async fn share_publicly(&self, token: &str, file_id: &str) -> Result<(), SyncError> {
        let response = self
            .client
            .post(format!("{}/{}/permissions", self.files_url, file_id))
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await?;
        check_response("Drive permissions", response).await?;
        Ok(())
    }
}
