use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single search page request
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeout, DNS, refused connection, or an unreadable body
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Server answered with a non-2xx status
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
}

impl FetchError {
    pub fn transport(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}
