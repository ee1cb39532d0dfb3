// src/google/sheets.rs
//! Sheets v4: find the target cell and write the image formula

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{check_response, SyncError};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Convert 1-based column/row to A1 notation (`(28, 3)` -> `AB3`)
pub fn a1(col: u32, row: u32) -> String {
    let mut letters = Vec::new();
    let mut x = col;
    while x > 0 {
        let rem = (x - 1) % 26;
        letters.push(b'A' + rem as u8);
        x = (x - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row)
}

/// First cell, scanning row by row, whose text contains `term` (case-insensitive).
/// Returns a sheet-qualified reference such as `Sheet1!C4`.
pub fn find_cell(values: &[Vec<Value>], term: &str, sheet: &str) -> Option<String> {
    let needle = term.to_lowercase();
    for (r, row) in values.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Value::String(text) = cell {
                if text.to_lowercase().contains(&needle) {
                    return Some(format!("{}!{}", sheet, a1(c as u32 + 1, r as u32 + 1)));
                }
            }
        }
    }
    None
}

pub fn image_formula(link: &str) -> String {
    format!("=IMAGE(\"{}\")", link)
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsClient {
    client: Client,
    spreadsheets_url: String,
}

impl SheetsClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, SHEETS_API_URL)
    }

    /// Talk to `base_url` instead of `sheets.googleapis.com`
    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            spreadsheets_url: format!("{}/v4/spreadsheets", base_url.trim_end_matches('/')),
        }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.spreadsheets_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Read a block of cells; trailing empty rows/cells are omitted by the API
    pub async fn get_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<Value>>, SyncError> {
        debug!("reading {} from spreadsheet {}", range, spreadsheet_id);
        let response = self
            .client
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .send()
            .await?;
        let range: ValueRange = check_response("Sheets", response).await?.json().await?;
        Ok(range.values)
    }

    /// Write one value as if typed by the user, so formulas are evaluated
    pub async fn update_cell(
        &self,
        token: &str,
        spreadsheet_id: &str,
        cell: &str,
        value: &str,
    ) -> Result<(), SyncError> {
        debug!("writing {} to {}", value, cell);
        let response = self
            .client
            .put(self.values_url(spreadsheet_id, cell))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&json!({ "values": [[value]] }))
            .send()
            .await?;
        check_response("Sheets", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::fake_api::FakeGoogleApi;
    use axum::http::{Method, StatusCode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_a1_notation() {
        assert_eq!(a1(1, 1), "A1");
        assert_eq!(a1(26, 5), "Z5");
        assert_eq!(a1(27, 2), "AA2");
        assert_eq!(a1(28, 3), "AB3");
        assert_eq!(a1(52, 1), "AZ1");
        assert_eq!(a1(53, 1), "BA1");
        assert_eq!(a1(702, 9), "ZZ9");
        assert_eq!(a1(703, 10), "AAA10");
    }

    #[test]
    fn test_find_cell_is_row_major_and_case_insensitive() {
        let values = vec![
            vec![json!("Name"), json!("Photo")],
            vec![json!("Alice"), json!(""), json!("please ADD here")],
            vec![json!("add"), json!(3)],
        ];
        assert_eq!(
            find_cell(&values, "add", "Sheet1"),
            Some("Sheet1!C2".to_string())
        );
    }

    #[test]
    fn test_find_cell_ignores_non_text_and_ragged_rows() {
        let values = vec![vec![], vec![json!(42), json!(true)], vec![json!(null), json!("x")]];
        assert_eq!(find_cell(&values, "42", "Data"), None);
        assert_eq!(find_cell(&values, "X", "Data"), Some("Data!B3".to_string()));
    }

    #[test]
    fn test_image_formula() {
        assert_eq!(
            image_formula("https://drive.google.com/uc?export=view&id=1"),
            "=IMAGE(\"https://drive.google.com/uc?export=view&id=1\")"
        );
    }

    #[test]
    fn test_values_url_escapes_range() {
        assert_eq!(
            SheetsClient::new(Client::new()).values_url("abc", "My Sheet!A1:Z200"),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/My%20Sheet%21A1%3AZ200"
        );
    }

    #[tokio::test]
    async fn test_update_cell_writes_user_entered_value() {
        let api = FakeGoogleApi::start(|_| (StatusCode::OK, json!({}))).await;
        let sheets = SheetsClient::with_base_url(Client::new(), &api.base_url);

        sheets
            .update_cell("tok", "sheet-1", "Data!C4", "=IMAGE(\"x\")")
            .await
            .unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/v4/spreadsheets/sheet-1/values/Data!C4");
        assert_eq!(request.query["valueInputOption"], "USER_ENTERED");
        assert_eq!(request.body_json(), json!({ "values": [["=IMAGE(\"x\")"]] }));
    }

    #[tokio::test]
    async fn test_get_values_surfaces_api_errors() {
        let api = FakeGoogleApi::start(|_| {
            (StatusCode::NOT_FOUND, json!({ "error": { "message": "Requested entity was not found." } }))
        })
        .await;
        let sheets = SheetsClient::with_base_url(Client::new(), &api.base_url);

        let err = sheets.get_values("tok", "missing", "Sheet1!A1:Z200").await.unwrap_err();
        match err {
            SyncError::Api { api, body, .. } => {
                assert_eq!(api, "Sheets");
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_value_range_without_values() {
        let range: ValueRange = serde_json::from_str(r#"{"range": "Sheet1!A1:Z200"}"#).unwrap();
        assert!(range.values.is_empty());
    }
}
