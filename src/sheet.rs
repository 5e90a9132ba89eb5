use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::XmapError;

pub const DEFAULT_SHEET_ID: &str = "1NwO-_BQumtfVYcTNP--vRa5434Elvj5me1oEKV1Q-gE";
pub const DEFAULT_SHEET_GID: &str = "1470945829";

pub fn export_url(sheet_id: &str, gid: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{sheet_id}/export?format=csv&gid={gid}")
}

pub trait SheetClient: Send + Sync {
    /// Returns the raw CSV bytes of one worksheet.
    fn export_csv(&self, sheet_id: &str, gid: &str) -> Result<Vec<u8>, XmapError>;
}

#[derive(Clone)]
pub struct SheetHttpClient {
    client: Client,
}

impl SheetHttpClient {
    pub fn new() -> Result<Self, XmapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cellset-xmap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| XmapError::SheetHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| XmapError::SheetHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl SheetClient for SheetHttpClient {
    fn export_csv(&self, sheet_id: &str, gid: &str) -> Result<Vec<u8>, XmapError> {
        let response = self
            .client
            .get(export_url(sheet_id, gid))
            .send()
            .map_err(|err| XmapError::SheetHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "spreadsheet request failed".to_string());
            return Err(XmapError::SheetStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| XmapError::SheetHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}
