//! Tabular storage: named sheets that are overwritten wholesale on each run.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration as StdDuration;
use tokio::sync::{Mutex, RwLock};

use crate::error::AppError;

pub const GOOGLE_NEWS_SHEET: &str = "Google News";
pub const TOP_STORIES_SHEET: &str = "Top Stories";
pub const TRENDS_RISING_SHEET: &str = "Google Trends Rising";
pub const TRENDS_TOP_SHEET: &str = "Google Trends Top";
pub const METADATA_SHEET: &str = "Metadata";
pub const SUMMARIES_SHEET: &str = "Summaries";

pub const DEFAULT_ROWS: usize = 100;
pub const DEFAULT_COLS: usize = 20;

/// Header row plus body rows as read back from a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    /// Build from raw values where the first row is the header. Short rows are
    /// padded to the header width.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return SheetTable::default();
        }
        let header = values.remove(0);
        let width = header.len();
        let rows = values
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        SheetTable { header, rows }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Cell value of `row` under column `name`, or "" if either is missing.
    pub fn cell<'a>(&'a self, row: &'a [String], name: &str) -> &'a str {
        self.column(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// How the spreadsheet interprets written cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInput {
    /// Stored verbatim as text.
    Raw,
    /// Parsed as if typed into the UI: numbers, dates and formulas.
    UserEntered,
}

impl ValueInput {
    pub fn as_param(self) -> &'static str {
        match self {
            ValueInput::Raw => "RAW",
            ValueInput::UserEntered => "USER_ENTERED",
        }
    }
}

/// Spreadsheet boundary. Every destination is addressed by its name.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Create the sheet with the default size if it does not exist yet.
    async fn ensure_sheet(&self, name: &str) -> Result<(), AppError>;

    /// Replace the whole sheet with `header` + `rows`, resized to fit exactly.
    async fn overwrite(
        &self,
        name: &str,
        header: &[&str],
        rows: Vec<Vec<String>>,
        input: ValueInput,
    ) -> Result<(), AppError>;

    /// Read the sheet back; `None` if it does not exist.
    async fn read_table(&self, name: &str) -> Result<Option<SheetTable>, AppError>;

    /// Append one row after the last non-empty row, creating the sheet if needed.
    async fn append_row(&self, name: &str, row: Vec<String>, input: ValueInput) -> Result<(), AppError>;
}

/// Ensure the destination exists, then overwrite it in one batched write.
#[tracing::instrument(skip(store, header, rows), fields(rows = rows.len()))]
pub async fn write_sheet(
    store: &dyn SheetStore,
    name: &str,
    header: &[&str],
    rows: Vec<Vec<String>>,
    input: ValueInput,
) -> Result<(), AppError> {
    store.ensure_sheet(name).await?;
    store.overwrite(name, header, rows, input).await?;
    tracing::info!("Wrote sheet '{}'", name);
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct MemorySheet {
    rows: usize,
    cols: usize,
    values: Vec<Vec<String>>,
    last_input: Option<ValueInput>,
}

impl MemorySheet {
    fn empty() -> Self {
        MemorySheet {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            values: Vec::new(),
            last_input: None,
        }
    }
}

/// Process-local store used when no spreadsheet is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemorySheetStore {
    sheets: RwLock<HashMap<String, MemorySheet>>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current grid size of a sheet as (rows, cols).
    pub async fn dimensions(&self, name: &str) -> Option<(usize, usize)> {
        self.sheets.read().await.get(name).map(|s| (s.rows, s.cols))
    }

    /// Value-input mode of the most recent write to a sheet.
    pub async fn last_value_input(&self, name: &str) -> Option<ValueInput> {
        self.sheets.read().await.get(name).and_then(|s| s.last_input)
    }
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn ensure_sheet(&self, name: &str) -> Result<(), AppError> {
        let mut sheets = self.sheets.write().await;
        sheets.entry(name.to_string()).or_insert_with(MemorySheet::empty);
        Ok(())
    }

    async fn overwrite(
        &self,
        name: &str,
        header: &[&str],
        rows: Vec<Vec<String>>,
        input: ValueInput,
    ) -> Result<(), AppError> {
        let mut sheets = self.sheets.write().await;
        let sheet = sheets
            .get_mut(name)
            .ok_or_else(|| AppError::StorageError(format!("worksheet '{}' not found", name)))?;
        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(header.iter().map(|h| h.to_string()).collect());
        values.extend(rows);
        sheet.rows = values.len();
        sheet.cols = header.len();
        sheet.values = values;
        sheet.last_input = Some(input);
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<Option<SheetTable>, AppError> {
        let sheets = self.sheets.read().await;
        Ok(sheets.get(name).map(|s| SheetTable::from_values(s.values.clone())))
    }

    async fn append_row(&self, name: &str, row: Vec<String>, input: ValueInput) -> Result<(), AppError> {
        let mut sheets = self.sheets.write().await;
        let sheet = sheets.entry(name.to_string()).or_insert_with(MemorySheet::empty);
        sheet.cols = sheet.cols.max(row.len());
        sheet.values.push(row);
        sheet.rows = sheet.rows.max(sheet.values.len());
        sheet.last_input = Some(input);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Google Sheets
// ---------------------------------------------------------------------------

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// The fields of a Google service-account key file that token minting needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("reading service account file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::ConfigError(format!("parsing service account file: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetInfo>,
}

#[derive(Debug, Deserialize)]
struct SheetInfo {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets v4 REST client authenticated as a service account.
pub struct GoogleSheetsClient {
    http: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    spreadsheet_id: String,
    base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsClient {
    pub fn new(spreadsheet_id: &str, key: ServiceAccountKey) -> Result<Self, AppError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AppError::ConfigError(format!("invalid service account private key: {}", e)))?;
        let http = Client::builder()
            .timeout(StdDuration::from_secs(60))
            .build()
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        Ok(Self {
            http,
            key,
            encoding_key,
            spreadsheet_id: spreadsheet_id.to_string(),
            base_url: SHEETS_API_URL.to_string(),
            token: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/{}", self.base_url, self.spreadsheet_id)
    }

    /// A1 range covering the whole named sheet.
    fn sheet_range(name: &str) -> String {
        format!("'{}'", name.replace('\'', "''"))
    }

    /// Cached OAuth2 access token, refreshed a minute before it expires.
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - 60 > now {
                return Ok(token.value.clone());
            }
        }

        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::StorageError(format!("signing token request: {}", e)))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            tracing::error!("Google token endpoint error: Status {}, Body: {}", status, error_text);
            return Err(AppError::StorageError(format!("token request returned {}", status)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("parsing token response: {}", e)))?;
        tracing::debug!("Obtained Google access token valid for {}s", token.expires_in);

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response, AppError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("{}: {}", what, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            tracing::error!("Sheets API error during {}: Status {}, Body: {}", what, status, error_text);
            return Err(AppError::StorageError(format!("{} returned {}", what, status)));
        }
        Ok(response)
    }

    async fn sheet_id(&self, name: &str) -> Result<Option<i64>, AppError> {
        let request = self
            .http
            .get(self.spreadsheet_url())
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let info: SpreadsheetInfo = self
            .send(request, "spreadsheets.get")
            .await?
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("parsing spreadsheet info: {}", e)))?;
        Ok(info
            .sheets
            .into_iter()
            .find(|s| s.properties.title == name)
            .map(|s| s.properties.sheet_id))
    }

    async fn batch_update(&self, requests: serde_json::Value) -> Result<(), AppError> {
        let request = self
            .http
            .post(format!("{}:batchUpdate", self.spreadsheet_url()))
            .json(&json!({ "requests": requests }));
        self.send(request, "spreadsheets.batchUpdate").await?;
        Ok(())
    }

    async fn add_sheet(&self, name: &str) -> Result<(), AppError> {
        tracing::info!("Creating worksheet '{}'", name);
        self.batch_update(json!([{
            "addSheet": {
                "properties": {
                    "title": name,
                    "gridProperties": { "rowCount": DEFAULT_ROWS, "columnCount": DEFAULT_COLS }
                }
            }
        }]))
        .await
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn ensure_sheet(&self, name: &str) -> Result<(), AppError> {
        if self.sheet_id(name).await?.is_none() {
            self.add_sheet(name).await?;
        }
        Ok(())
    }

    async fn overwrite(
        &self,
        name: &str,
        header: &[&str],
        rows: Vec<Vec<String>>,
        input: ValueInput,
    ) -> Result<(), AppError> {
        let sheet_id = self
            .sheet_id(name)
            .await?
            .ok_or_else(|| AppError::StorageError(format!("worksheet '{}' not found", name)))?;

        // Shrinking the grid drops whatever the previous run left beyond the new extent.
        self.batch_update(json!([{
            "updateSheetProperties": {
                "properties": {
                    "sheetId": sheet_id,
                    "gridProperties": { "rowCount": rows.len() + 1, "columnCount": header.len().max(1) }
                },
                "fields": "gridProperties(rowCount,columnCount)"
            }
        }]))
        .await?;

        let mut values: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
        values.push(header.iter().map(|h| h.to_string()).collect());
        values.extend(rows);

        let range = format!("{}!A1", Self::sheet_range(name));
        let request = self
            .http
            .put(format!("{}/values/{}", self.spreadsheet_url(), range))
            .query(&[("valueInputOption", input.as_param())])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": values }));
        self.send(request, "values.update").await?;
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<Option<SheetTable>, AppError> {
        if self.sheet_id(name).await?.is_none() {
            return Ok(None);
        }
        let request = self
            .http
            .get(format!("{}/values/{}", self.spreadsheet_url(), Self::sheet_range(name)))
            .query(&[("valueRenderOption", "FORMATTED_VALUE")]);
        let range: ValueRange = self
            .send(request, "values.get")
            .await?
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("parsing values of '{}': {}", name, e)))?;

        let values = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        Ok(Some(SheetTable::from_values(values)))
    }

    async fn append_row(&self, name: &str, row: Vec<String>, input: ValueInput) -> Result<(), AppError> {
        self.ensure_sheet(name).await?;
        let range = format!("{}!A1", Self::sheet_range(name));
        let request = self
            .http
            .post(format!("{}/values/{}:append", self.spreadsheet_url(), range))
            .query(&[("valueInputOption", input.as_param()), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [row] }));
        self.send(request, "values.append").await?;
        Ok(())
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
