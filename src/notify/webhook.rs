use crate::models::ListingRecord;
use crate::notify::{build_payloads, NotifyError, NotifyReport, Notifier, WebhookPayload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Message ids kept for `clear_recent`
const SENT_HISTORY_LIMIT: usize = 500;

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

/// Posts listing embeds to a chat webhook, one request per chunk
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    username: String,
    /// Ids of messages posted by this process, oldest first
    sent: Mutex<VecDeque<String>>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: &str, username: &str) -> Result<Self> {
        let url = Url::parse(webhook_url).context("WEBHOOK_URL is not a valid URL")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            username: username.to_string(),
            sent: Mutex::new(VecDeque::new()),
        })
    }

    async fn post_chunk(&self, payload: &WebhookPayload) -> Result<Option<String>, NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .query(&[("wait", "true")])
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        // With wait=true the created message is echoed back
        match response.json::<SentMessage>().await {
            Ok(message) => Ok(Some(message.id)),
            Err(e) => {
                debug!("Webhook response carried no message id: {}", e);
                Ok(None)
            }
        }
    }

    /// Message endpoint; a `thread_id` on the webhook URL is carried over
    fn message_url(&self, id: &str) -> Result<Url, NotifyError> {
        let thread_id = self
            .url
            .query_pairs()
            .find(|(k, _)| k == "thread_id")
            .map(|(_, v)| v.into_owned());

        let mut url = self.url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| NotifyError::InvalidUrl(self.url.to_string()))?
            .pop_if_empty()
            .push("messages")
            .push(id);
        if let Some(thread_id) = thread_id {
            url.query_pairs_mut().append_pair("thread_id", &thread_id);
        }
        Ok(url)
    }

    async fn delete_message(&self, id: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .delete(self.message_url(id)?)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(Box::new(e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Status { status, body })
        }
    }

    async fn remember(&self, id: String) {
        let mut sent = self.sent.lock().await;
        sent.push_back(id);
        while sent.len() > SENT_HISTORY_LIMIT {
            sent.pop_front();
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, records: &[ListingRecord]) -> NotifyReport {
        let payloads = build_payloads(records, &self.username, Utc::now());
        let mut report = NotifyReport::default();

        for (i, payload) in payloads.iter().enumerate() {
            match self.post_chunk(payload).await {
                Ok(id) => {
                    info!(
                        "Webhook message sent successfully! (chunk {}/{}, {} listings)",
                        i + 1,
                        payloads.len(),
                        payload.embeds.len()
                    );
                    if let Some(id) = id {
                        self.remember(id).await;
                    }
                    report.chunks_sent += 1;
                }
                Err(NotifyError::Status { status, body }) => {
                    error!("Failed to send message: chunk {} rejected", i + 1);
                    error!("Response: {} - {}", status, body);
                    report.chunks_failed += 1;
                }
                Err(e) => {
                    error!("Failed to send message: chunk {}: {}", i + 1, e);
                    report.chunks_failed += 1;
                }
            }
        }

        report
    }

    async fn clear_recent(&self, limit: usize) -> Result<usize, NotifyError> {
        let targets: Vec<String> = {
            let mut sent = self.sent.lock().await;
            let len = sent.len();
            sent.split_off(len - limit.min(len)).into_iter().rev().collect()
        };

        let mut deleted = 0;
        for id in &targets {
            match self.delete_message(id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to delete message {}: {}", id, e),
            }
        }

        info!("Deleted {} of {} recent messages", deleted, targets.len());
        Ok(deleted)
    }
}
