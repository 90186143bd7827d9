//! Output sinks for forwarded records
//!
//! Every unique record is written as one line to each configured sink. Sinks
//! are independent: a failure in one is logged and never blocks the others.

pub mod console;
pub mod rotating_file;
#[cfg(unix)]
pub mod syslog;

use async_trait::async_trait;

pub use console::ConsoleSink;
pub use rotating_file::RotatingFileSink;
#[cfg(unix)]
pub use syslog::SyslogSink;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Unavailable(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Unavailable(msg) => write!(f, "Sink unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

#[async_trait]
pub trait Sink: Send {
    /// Write one record line (without trailing newline)
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError>;

    /// Flush pending writes
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Writes each line to all configured sinks
#[derive(Default)]
pub struct SinkFanout {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn backend_types(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.backend_type()).collect()
    }

    /// Deliver `line` everywhere. Returns the number of sinks that accepted it.
    pub async fn write_line(&mut self, line: &str) -> usize {
        let mut delivered = 0;
        for sink in self.sinks.iter_mut() {
            match sink.write_line(line).await {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!(
                    "⚠️  Failed to write to {} sink: {}",
                    sink.backend_type(),
                    e
                ),
            }
        }
        delivered
    }

    pub async fn flush(&mut self) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush().await {
                log::warn!("⚠️  Failed to flush {} sink: {}", sink.backend_type(), e);
            }
        }
    }
}
