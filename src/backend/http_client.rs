//! HTTP client for the event backend
//!
//! ## Endpoints
//!
//! - `POST {api_host}/api/v1/source/query/` with
//!   `{"org_uid", "data_type": "htapp", "start_time", "end_time"}`;
//!   the response body is streamed back as newline-delimited JSON.
//! - `GET {api_host}/api/v1/org/{org_uid}/source/` returns the known sources;
//!   each source's `runtime_details` is what augmentation appends to records.

use super::{BackendError, EventSource, RecordStream};
use crate::config::ForwarderConfig;
use crate::forwarder_core::record::append_field;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    org_uid: &'a str,
    data_type: &'a str,
    start_time: i64,
    end_time: i64,
}

/// One entry of the source list
#[derive(Debug, Clone, Deserialize)]
pub struct SourceInfo {
    pub uid: String,
    #[serde(default)]
    pub runtime_details: Option<serde_json::Value>,
}

pub struct HttpEventSource {
    client: reqwest::Client,
    api_host: String,
    api_key: String,
    org_uid: String,
    /// muid -> serialized runtime_details
    sources: RwLock<HashMap<String, String>>,
}

impl HttpEventSource {
    pub fn new(
        api_host: impl Into<String>,
        api_key: impl Into<String>,
        org_uid: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!("event-forwarder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_host: api_host.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            org_uid: org_uid.into(),
            sources: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &ForwarderConfig) -> Result<Self, BackendError> {
        Self::new(
            config.api_host.clone(),
            config.api_key.clone(),
            config.org_uid.clone(),
            config.query_timeout,
        )
    }

    /// Swap in a new source table. Returns the number of sources.
    pub fn replace_sources(&self, sources: Vec<SourceInfo>) -> usize {
        let count = sources.len();
        let table: HashMap<String, String> = sources
            .into_iter()
            .filter_map(|source| {
                let details = source.runtime_details?;
                if details.is_null() {
                    return None;
                }
                serde_json::to_string(&details)
                    .ok()
                    .map(|json| (source.uid, json))
            })
            .collect();

        match self.sources.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
        count
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        })
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordStream, BackendError> {
        let url = format!("{}/api/v1/source/query/", self.api_host);
        let request = QueryRequest {
            org_uid: &self.org_uid,
            data_type: "htapp",
            start_time: start.timestamp(),
            end_time: end.timestamp(),
        };

        log::debug!("🔎 Querying {} [{} .. {})", url, start, end);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Box::pin(Box::pin(body).into_async_read()))
    }

    fn augment(&self, record: &mut Vec<u8>, muid: &str) {
        let details = {
            let table = match self.sources.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match table.get(muid) {
                Some(details) => details.clone(),
                None => return,
            }
        };

        // Records that already carry runtime details (or aren't objects) are left alone
        match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(record) {
            Ok(object) if !object.contains_key("runtime_details") => {
                append_field(record, "runtime_details", &details);
            }
            _ => {}
        }
    }

    async fn refresh_sources(&self) -> Result<usize, BackendError> {
        let url = format!("{}/api/v1/org/{}/source/", self.api_host, self.org_uid);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.bytes().await?;
        let sources: Vec<SourceInfo> = serde_json::from_slice(&body)?;
        Ok(self.replace_sources(sources))
    }
}
