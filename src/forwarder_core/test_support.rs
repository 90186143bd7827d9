//! Scripted event source and capturing sink shared by the unit tests

use crate::backend::{BackendError, EventSource, RecordStream};
use crate::forwarder_core::record::append_field;
use crate::sinks::{Sink, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::{AsyncRead, BufReader, Cursor};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

pub enum Response {
    Body(Vec<u8>),
    BrokenBody(Vec<u8>),
    Fail,
    Hang,
}

#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Response>>,
    pub windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    details: HashMap<String, String>,
    corrupt_muid: Option<String>,
    pub refreshes: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(self, responses: Vec<Response>) -> Self {
        *self.responses.lock().unwrap() = responses.into();
        self
    }

    pub fn with_runtime_details(mut self, muid: &str, details: &str) -> Self {
        self.details.insert(muid.to_string(), details.to_string());
        self
    }

    /// Augmenting a record with this muid breaks its JSON.
    pub fn with_corrupting_augment(mut self, muid: &str) -> Self {
        self.corrupt_muid = Some(muid.to_string());
        self
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordStream, BackendError> {
        self.windows.lock().unwrap().push((start, end));
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Response::Body(body)) => Ok(Box::pin(Cursor::new(body))),
            Some(Response::BrokenBody(body)) => Ok(Box::pin(BufReader::new(FailAfter::new(body)))),
            Some(Response::Fail) => Err(BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Some(Response::Hang) => std::future::pending().await,
            None => Ok(Box::pin(Cursor::new(Vec::new()))),
        }
    }

    fn augment(&self, record: &mut Vec<u8>, muid: &str) {
        if self.corrupt_muid.as_deref() == Some(muid) {
            record.extend_from_slice(b"{{");
        } else if let Some(details) = self.details.get(muid) {
            append_field(record, "runtime_details", details);
        }
    }

    async fn refresh_sources(&self) -> Result<usize, BackendError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.details.len())
    }
}

/// Yields `data`, then fails every read
pub struct FailAfter {
    data: Vec<u8>,
    pos: usize,
}

impl FailAfter {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl AsyncRead for FailAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.pos < self.data.len() {
            let n = buf.len().min(self.data.len() - self.pos);
            let start = self.pos;
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(n))
        } else {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }
}

pub struct CaptureSink(Arc<Mutex<Vec<String>>>);

impl CaptureSink {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        (Self(lines.clone()), lines)
    }
}

#[async_trait]
impl Sink for CaptureSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "capture"
    }
}
