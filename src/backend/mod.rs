//! Remote event source
//!
//! The forwarder only needs three things from the backend: a windowed query
//! returning newline-delimited JSON, best-effort per-record augmentation, and a
//! periodic refresh of the known sources that augmentation draws on.

pub mod http_client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::AsyncBufRead;
use std::pin::Pin;

pub use http_client::HttpEventSource;

/// Newline-delimited JSON records returned by a query
pub type RecordStream = Pin<Box<dyn AsyncBufRead + Send>>;

#[derive(Debug)]
pub enum BackendError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Decode(serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err)
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Http(e) => write!(f, "HTTP error: {}", e),
            BackendError::Status { status, body } => {
                write!(f, "Backend returned status {}: {}", status, body)
            }
            BackendError::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for BackendError {}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Request all records in `[start, end)`.
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordStream, BackendError>;

    /// Enrich `record` in place with details about the source `muid`.
    /// Best-effort: leaves the record untouched when nothing is known.
    fn augment(&self, record: &mut Vec<u8>, muid: &str);

    /// Reload the list of known sources. Returns how many are known.
    async fn refresh_sources(&self) -> Result<usize, BackendError>;
}
