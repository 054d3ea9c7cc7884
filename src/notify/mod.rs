pub mod embed;
pub mod webhook;

use crate::models::ListingRecord;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use embed::{build_payloads, WebhookPayload};
pub use webhook::WebhookNotifier;

/// Failure of one outbound call
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("webhook returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),
}

/// Outcome of one `notify` call, one entry per chunk
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NotifyReport {
    pub chunks_sent: usize,
    pub chunks_failed: usize,
}

impl NotifyReport {
    pub fn chunks(&self) -> usize {
        self.chunks_sent + self.chunks_failed
    }
}

/// Publishes new listings to a chat channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce records in chunks; a failed chunk does not stop the rest
    async fn notify(&self, records: &[ListingRecord]) -> NotifyReport;

    /// Remove up to `limit` of the most recent messages this notifier posted
    async fn clear_recent(&self, limit: usize) -> Result<usize, NotifyError>;
}
