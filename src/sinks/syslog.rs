//! Local syslog forwarding over the unix datagram socket (RFC 3164 framing)

use super::{Sink, SinkError};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::net::UnixDatagram;

const SOCKET_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

const FACILITY_USER: u8 = 1;
const SEVERITY_ALERT: u8 = 1;

pub const SYSLOG_TAG: &str = "event-forwarder";

pub struct SyslogSink {
    socket: UnixDatagram,
    path: PathBuf,
    tag: String,
    pid: u32,
}

impl SyslogSink {
    /// Connect to the first local syslog socket that accepts us.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_local(tag: &str) -> Result<Self, SinkError> {
        let mut last_err = None;
        for path in SOCKET_PATHS {
            match Self::connect(Path::new(path), tag) {
                Ok(sink) => return Ok(sink),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| SinkError::Unavailable("no syslog socket".to_string())))
    }

    pub fn connect(path: &Path, tag: &str) -> Result<Self, SinkError> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self {
            socket,
            path: path.to_path_buf(),
            tag: tag.to_string(),
            pid: std::process::id(),
        })
    }

    fn frame(&self, line: &str) -> String {
        let priority = FACILITY_USER * 8 + SEVERITY_ALERT;
        format!(
            "<{}>{} {}[{}]: {}",
            priority,
            Local::now().format("%b %e %H:%M:%S"),
            self.tag,
            self.pid,
            line
        )
    }

    fn reconnect(&mut self) -> Result<(), SinkError> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(&self.path)?;
        self.socket = socket;
        Ok(())
    }
}

#[async_trait]
impl Sink for SyslogSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let message = self.frame(line);
        if self.socket.send(message.as_bytes()).await.is_ok() {
            return Ok(());
        }
        // syslogd restarts drop the connection; retry once on a fresh socket
        self.reconnect()?;
        self.socket.send(message.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "syslog"
    }
}
