use serde::{Deserialize, Serialize};

/// Placeholder stored when a scalar field could not be extracted
pub const NOT_AVAILABLE: &str = "N/A";

/// One property result scraped from the search page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    /// Identity key for deduplication
    pub address: String,
    pub price: String,
    pub image_url: String,
    /// Feature tags in page order
    #[serde(default)]
    pub details: Vec<String>,
    pub area_code: Option<String>,
    /// Set once a notification has been attempted; never cleared
    #[serde(default)]
    pub processed: bool,
}

impl ListingRecord {
    pub fn new(address: String, price: String, image_url: String, details: Vec<String>) -> Self {
        let area_code = area_code_of(&address);
        Self {
            address,
            price,
            image_url,
            details,
            area_code,
            processed: false,
        }
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty() && self.image_url != NOT_AVAILABLE
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
    }
}

/// Last `", "`-separated token of an address, e.g. "Dublin 15"
pub fn area_code_of(address: &str) -> Option<String> {
    let (_, tail) = address.rsplit_once(", ")?;
    let tail = tail.trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}
