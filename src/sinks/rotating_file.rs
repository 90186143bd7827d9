//! Size-rotated event log
//!
//! Events go to `<dir>/forwarded_events.log`. Once that file would grow past
//! `max_size_mb` it is renamed to `forwarded_events-<UTC timestamp>.log` and a
//! fresh file is opened; only the newest `max_backups` rotated files are kept.
//! The same prefix/suffix convention is what startup recovery scans for.

use super::{Sink, SinkError};
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const EVENT_LOG_PREFIX: &str = "forwarded_events";
pub const EVENT_LOG_SUFFIX: &str = ".log";

/// True for the active event log and its rotated backups.
pub fn is_event_log_name(name: &str) -> bool {
    name.starts_with(EVENT_LOG_PREFIX) && name.ends_with(EVENT_LOG_SUFFIX)
}

pub struct RotatingFileSink {
    file: BufWriter<File>,
    current_size: u64,
    max_size: u64,
    dir: PathBuf,
    base_path: PathBuf,
    rotation_count: u32,
    max_backups: usize,
}

impl RotatingFileSink {
    pub fn new(
        dir: impl AsRef<Path>,
        max_size_mb: u64,
        max_backups: usize,
    ) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let base_path = dir.join(format!("{}{}", EVENT_LOG_PREFIX, EVENT_LOG_SUFFIX));
        let file = OpenOptions::new().create(true).append(true).open(&base_path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            file: BufWriter::new(file),
            current_size,
            max_size: max_size_mb.max(1) * 1024 * 1024,
            dir,
            base_path,
            rotation_count: 0,
            max_backups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    #[cfg(test)]
    fn with_max_size_bytes(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    fn write_record(&mut self, line: &str) -> Result<(), SinkError> {
        let len = (line.len() + 1) as u64;
        if self.current_size > 0 && self.current_size + len > self.max_size {
            self.rotate()?;
        }

        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        self.current_size += len;
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.9f");
        let mut candidate = self
            .dir
            .join(format!("{}-{}{}", EVENT_LOG_PREFIX, stamp, EVENT_LOG_SUFFIX));
        let mut n = 1;
        while candidate.exists() {
            candidate = self
                .dir
                .join(format!("{}-{}.{}{}", EVENT_LOG_PREFIX, stamp, n, EVENT_LOG_SUFFIX));
            n += 1;
        }
        candidate
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        self.file.flush()?;

        let rotated_path = self.backup_path();
        if self.base_path.exists() {
            std::fs::rename(&self.base_path, &rotated_path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base_path)?;

        self.file = BufWriter::new(file);
        self.current_size = 0;
        self.rotation_count += 1;

        log::info!(
            "📄 Rotated event log to {} (rotation #{})",
            rotated_path.display(),
            self.rotation_count
        );

        if let Err(e) = self.remove_old_backups() {
            log::warn!("⚠️  Failed to prune old event logs: {}", e);
        }
        Ok(())
    }

    fn backups(&self) -> Result<Vec<PathBuf>, SinkError> {
        let active = format!("{}{}", EVENT_LOG_PREFIX, EVENT_LOG_SUFFIX);
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_event_log_name(name) && name != active {
                backups.push(entry.path());
            }
        }
        // Timestamps sort lexically
        backups.sort();
        Ok(backups)
    }

    fn remove_old_backups(&self) -> Result<(), SinkError> {
        let backups = self.backups()?;
        if backups.len() <= self.max_backups {
            return Ok(());
        }
        for old in &backups[..backups.len() - self.max_backups] {
            std::fs::remove_file(old)?;
            log::debug!("🗑️  Removed old event log {}", old.display());
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for RotatingFileSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.write_record(line)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.file.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
