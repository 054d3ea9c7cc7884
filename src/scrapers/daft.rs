use crate::scrapers::{FetchError, ListingFetcher, RawDocument, SearchParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

/// User agents rotated per request
const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
];

/// Daft.ie search page fetcher
pub struct DaftFetcher {
    client: Client,
    url: Url,
}

impl DaftFetcher {
    /// Create a new fetcher with default search parameters (Dublin + Meath)
    #[cfg(test)]
    pub fn new() -> Result<Self> {
        Self::with_params(&SearchParams::default(), Duration::from_secs(30))
    }

    /// Create a new fetcher with custom search parameters
    pub fn with_params(params: &SearchParams, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers())
            .build()
            .context("Failed to create HTTP client")?;
        let url = params.search_url()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Pick a user agent from the pool
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Static headers that make the request look like a browser navigation
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.daft.ie/"));
    headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("document"));
    headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("navigate"));
    headers.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static("same-origin"));
    headers.insert(HeaderName::from_static("sec-fetch-user"), HeaderValue::from_static("?1"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers
}

#[async_trait]
impl ListingFetcher for DaftFetcher {
    async fn fetch(&self) -> Result<RawDocument, FetchError> {
        let user_agent = random_user_agent();
        debug!("Fetching URL: {} (user agent: {})", self.url, user_agent);

        let response = self
            .client
            .get(self.url.clone())
            .header(header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| FetchError::transport(self.url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Daft returned status: {}", status);
            return Err(FetchError::Status {
                url: self.url.to_string(),
                status,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(self.url.as_str(), e))?;

        info!("Downloaded {} bytes of HTML", body.len());

        Ok(RawDocument::new(self.url.as_str(), body))
    }

    fn source_name(&self) -> &'static str {
        "Daft"
    }
}
