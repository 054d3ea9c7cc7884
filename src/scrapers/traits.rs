use crate::scrapers::error::FetchError;
use crate::scrapers::types::RawDocument;
use async_trait::async_trait;

/// Source of raw search result markup
/// Implemented by the live site fetcher and by test doubles
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    /// Fetch the search page once
    async fn fetch(&self) -> Result<RawDocument, FetchError>;

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}
