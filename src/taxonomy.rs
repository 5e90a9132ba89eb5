use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::domain::Taxonomy;
use crate::error::XmapError;
use crate::fs_util::read_to_string;

pub trait TaxonomyClient: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Taxonomy, XmapError>;
}

#[derive(Clone)]
pub struct TaxonomyHttpClient {
    client: Client,
}

impl TaxonomyHttpClient {
    pub fn new() -> Result<Self, XmapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cellset-xmap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| XmapError::TaxonomyHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| XmapError::TaxonomyHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl TaxonomyClient for TaxonomyHttpClient {
    fn fetch(&self, url: &str) -> Result<Taxonomy, XmapError> {
        info!(url, "downloading taxonomy");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| XmapError::TaxonomyHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "taxonomy request failed".to_string());
            return Err(XmapError::TaxonomyStatus { status, message });
        }
        let taxonomy: Taxonomy = response.json().map_err(|err| {
            if err.is_decode() {
                XmapError::TaxonomyParse(err.to_string())
            } else {
                XmapError::TaxonomyHttp(err.to_string())
            }
        })?;
        info!(annotations = taxonomy.annotations.len(), "taxonomy loaded");
        Ok(taxonomy)
    }
}

/// Reads a taxonomy JSON that was saved locally.
pub fn load_taxonomy_file(path: &Utf8Path) -> Result<Taxonomy, XmapError> {
    let raw = read_to_string(path)?;
    Taxonomy::from_json(&raw)
}
