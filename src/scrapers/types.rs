use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const SEARCH_BASE_URL: &str = "https://www.daft.ie/property-for-sale/ireland";

/// Search parameters encoded into the fixed search URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Location slugs, sent as repeated `location` parameters
    pub locations: Vec<String>,
    /// Minimum sale price (EUR)
    pub min_price: Option<u64>,
    /// Maximum sale price (EUR)
    pub max_price: Option<u64>,
    /// Results per request; only one page is ever fetched
    pub page_size: u32,
    /// Result offset
    pub offset: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            locations: vec!["dublin".to_string(), "meath".to_string()],
            min_price: Some(150_000),
            max_price: Some(200_000),
            page_size: 100,
            offset: 0,
        }
    }
}

impl SearchParams {
    /// Build the search URL for these parameters
    pub fn search_url(&self) -> Result<Url> {
        let mut url = Url::parse(SEARCH_BASE_URL).context("Invalid search base URL")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("terms", "");
            query.append_pair("adState", "published");
            for location in &self.locations {
                query.append_pair("location", location);
            }
            if let Some(max) = self.max_price {
                query.append_pair("salePrice_to", &max.to_string());
            }
            if let Some(min) = self.min_price {
                query.append_pair("salePrice_from", &min.to_string());
            }
            query.append_pair("pageSize", &self.page_size.to_string());
            query.append_pair("from", &self.offset.to_string());
        }
        Ok(url)
    }
}

/// Raw markup returned by a fetch
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub body: String,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}
