use crate::models::ListingRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook limit on embeds per message
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

const EMBED_COLOR: u32 = 0x00ff00;
const MAX_TITLE_CHARS: usize = 256;
const MAX_FIELD_CHARS: usize = 1024;
/// Webhook limit on the summed text of all embeds in one message
pub const MAX_MESSAGE_CHARS: usize = 6000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: impl AsRef<str>, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: truncate(value.as_ref(), MAX_FIELD_CHARS),
            inline,
        }
    }
}

/// Display unit for one listing
pub fn embed_for(record: &ListingRecord, timestamp: DateTime<Utc>) -> Embed {
    let mut fields = vec![
        EmbedField::new("Address", &record.address, true),
        EmbedField::new("Price", &record.price, true),
    ];
    if let Some(area) = &record.area_code {
        fields.push(EmbedField::new("Area", area, true));
    }
    if !record.details.is_empty() {
        fields.push(EmbedField::new("Details", record.details.join(", "), false));
    }

    let image = if record.has_image() {
        fields.push(EmbedField::new(
            "URL",
            format!("[View Image]({})", record.image_url),
            false,
        ));
        Some(EmbedImage {
            url: record.image_url.clone(),
        })
    } else {
        None
    };

    let mut embed = Embed {
        title: truncate(&record.address, MAX_TITLE_CHARS),
        description: truncate(&format!("**Price:** {}", record.price), MAX_FIELD_CHARS),
        color: EMBED_COLOR,
        image,
        fields,
        timestamp: Some(timestamp),
    };

    // Details are the only open-ended text; shrink them so one embed fits a message
    let excess = embed.text_len().saturating_sub(MAX_MESSAGE_CHARS);
    if excess > 0 {
        if let Some(details) = embed.fields.iter_mut().find(|f| f.name == "Details") {
            let keep = details.value.chars().count().saturating_sub(excess).max(1);
            details.value = truncate(&details.value, keep);
        }
    }
    embed
}

impl Embed {
    /// Characters counted against [`MAX_MESSAGE_CHARS`]
    pub fn text_len(&self) -> usize {
        self.title.chars().count()
            + self.description.chars().count()
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }
}

/// Payloads in record order, each with at most [`MAX_EMBEDS_PER_MESSAGE`]
/// embeds and [`MAX_MESSAGE_CHARS`] of embed text
pub fn build_payloads(
    records: &[ListingRecord],
    username: &str,
    timestamp: DateTime<Utc>,
) -> Vec<WebhookPayload> {
    let mut payloads = Vec::new();
    let mut embeds: Vec<Embed> = Vec::new();
    let mut chars = 0;

    for record in records {
        let embed = embed_for(record, timestamp);
        let len = embed.text_len();
        let full = embeds.len() == MAX_EMBEDS_PER_MESSAGE || chars + len > MAX_MESSAGE_CHARS;
        if full && !embeds.is_empty() {
            payloads.push(WebhookPayload {
                username: username.to_string(),
                embeds: std::mem::take(&mut embeds),
            });
            chars = 0;
        }
        chars += len;
        embeds.push(embed);
    }

    if !embeds.is_empty() {
        payloads.push(WebhookPayload {
            username: username.to_string(),
            embeds,
        });
    }
    payloads
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
