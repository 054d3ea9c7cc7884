use crate::models::{ListingRecord, NOT_AVAILABLE};
use crate::scrapers::types::RawDocument;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Which extracted records are worth keeping
#[derive(Debug, Clone)]
pub struct ExtractPolicy {
    /// Lowercased tokens; an address containing any of them is dropped
    pub excluded_address_tokens: Vec<String>,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self::excluding(["site"])
    }
}

impl ExtractPolicy {
    pub fn excluding<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded_address_tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn excludes(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.excluded_address_tokens
            .iter()
            .any(|token| address.contains(token.as_str()))
    }
}

/// Structural markers of a search result card
struct Selectors {
    listing: Selector,
    address: Selector,
    price: Selector,
    meta: Selector,
    image_container: Selector,
    paragraph: Selector,
    image: Selector,
}

impl Selectors {
    fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector must parse");
        Self {
            listing: parse(r#"li[data-testid*="result"]"#),
            address: parse(r#"div[data-tracking="srp_address"]"#),
            price: parse(r#"div[data-tracking="srp_price"]"#),
            meta: parse(r#"div[data-tracking="srp_meta"]"#),
            image_container: parse(r#"div[data-testid="imageContainer"]"#),
            paragraph: parse("p"),
            image: parse("img"),
        }
    }
}

/// Turns search page markup into listing records
pub struct Extractor {
    selectors: Selectors,
    policy: ExtractPolicy,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractPolicy::default())
    }
}

impl Extractor {
    pub fn new(policy: ExtractPolicy) -> Self {
        Self {
            selectors: Selectors::new(),
            policy,
        }
    }

    /// Parse every listing card in the document
    ///
    /// Never fails: missing fields become "N/A" (or no details), cards without
    /// an address and cards excluded by policy are dropped, and a repeated
    /// address keeps only its first card.
    pub fn extract(&self, doc: &RawDocument) -> Vec<ListingRecord> {
        let document = Html::parse_document(&doc.body);
        let cards: Vec<_> = document.select(&self.selectors.listing).collect();

        if cards.is_empty() {
            warn!("No listings found on the page.");
            return Vec::new();
        }
        debug!("Found {} listing cards in {}", cards.len(), doc.url);

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (idx, card) in cards.iter().enumerate() {
            let record = self.parse_card(card);

            if record.address == NOT_AVAILABLE {
                debug!("Skipped card {}: no address", idx);
                continue;
            }
            if self.policy.excludes(&record.address) {
                debug!("Skipped card {}: '{}' excluded by policy", idx, record.address);
                continue;
            }
            if !seen.insert(record.address.clone()) {
                debug!("Skipped card {}: duplicate address '{}'", idx, record.address);
                continue;
            }

            records.push(record);
        }

        info!("Extracted {} listings from {} cards", records.len(), cards.len());
        records
    }

    fn parse_card(&self, card: &ElementRef) -> ListingRecord {
        let address = self
            .first_paragraph(card, &self.selectors.address)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let price = self
            .first_paragraph(card, &self.selectors.price)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let details = card
            .select(&self.selectors.meta)
            .map(|meta| element_text(&meta))
            .filter(|text| !text.is_empty())
            .collect();

        let image_url = card
            .select(&self.selectors.image_container)
            .next()
            .and_then(|container| container.select(&self.selectors.image).next())
            .and_then(|img| img.value().attr("src"))
            .map(|src| src.trim().to_string())
            .filter(|src| !src.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        ListingRecord::new(address, price, image_url, details)
    }

    /// Text of the first `<p>` under the first container matching `container`
    fn first_paragraph(&self, card: &ElementRef, container: &Selector) -> Option<String> {
        let container = card.select(container).next()?;
        let paragraph = container.select(&self.selectors.paragraph).next()?;
        let text = element_text(&paragraph);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Text content with whitespace runs collapsed to single spaces
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
