use crate::scrapers::{ExtractPolicy, SearchParams};
use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub webhook_url: String,
    pub webhook_username: String,
    pub owner_id: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub dedup_path: PathBuf,
    pub dedup_max_entries: Option<usize>,
    pub snapshot_path: PathBuf,
    pub log_file: PathBuf,
    pub search: SearchParams,
    pub excluded_address_tokens: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let poll_interval_secs: u64 = parse(&required("POLL_INTERVAL_SECS")?, "POLL_INTERVAL_SECS")?;
        if poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECS must be greater than zero");
        }

        let defaults = SearchParams::default();
        let search = SearchParams {
            locations: get("SEARCH_LOCATIONS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.locations),
            min_price: optional(&get, "SEARCH_PRICE_FROM")?.or(defaults.min_price),
            max_price: optional(&get, "SEARCH_PRICE_TO")?.or(defaults.max_price),
            page_size: optional(&get, "SEARCH_PAGE_SIZE")?.unwrap_or(defaults.page_size),
            offset: defaults.offset,
        };

        let dedup_max_entries: Option<usize> = optional(&get, "DEDUP_MAX_ENTRIES")?;
        if let Some(cap) = dedup_max_entries {
            if cap < search.page_size as usize {
                bail!(
                    "DEDUP_MAX_ENTRIES ({}) must be at least SEARCH_PAGE_SIZE ({})",
                    cap,
                    search.page_size
                );
            }
        }

        Ok(Self {
            webhook_url: required("WEBHOOK_URL")?,
            webhook_username: get("WEBHOOK_USERNAME").unwrap_or_else(|| "Daft Bot".to_string()),
            owner_id: required("OWNER_ID")?,
            poll_interval: Duration::from_secs(poll_interval_secs),
            fetch_timeout: Duration::from_secs(
                optional(&get, "FETCH_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            dedup_path: get("DEDUP_PATH")
                .unwrap_or_else(|| "known_properties.txt".to_string())
                .into(),
            dedup_max_entries,
            snapshot_path: get("SNAPSHOT_PATH")
                .unwrap_or_else(|| "all_properties.json".to_string())
                .into(),
            log_file: get("LOG_FILE")
                .unwrap_or_else(|| "scraper.log".to_string())
                .into(),
            search,
            excluded_address_tokens: get("EXCLUDE_ADDRESS_TOKENS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|| vec!["site".to_string()]),
        })
    }

    pub fn extract_policy(&self) -> ExtractPolicy {
        ExtractPolicy::excluding(&self.excluded_address_tokens)
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a valid number", key))
}

fn optional<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key).map(|v| parse(&v, key)).transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
