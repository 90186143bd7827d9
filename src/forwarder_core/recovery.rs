//! Startup state recovery from previously written event logs
//!
//! Every line already on disk was forwarded before, so its digest seeds the
//! recency cache whether or not it parses. Lines that do parse also yield the
//! newest record time, which is where the next query window starts.

use super::recency_cache::RecencyCache;
use super::record::{digest, RecordFields, RecordTime};
use crate::sinks::rotating_file::is_event_log_name;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct RecoveryError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to read {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
pub struct RecoveredState {
    pub last_seen: Option<RecordTime>,
    pub cache: RecencyCache,
    pub files_loaded: usize,
    pub lines_loaded: usize,
}

impl RecoveredState {
    pub fn empty(cache_capacity: usize) -> Self {
        Self {
            last_seen: None,
            cache: RecencyCache::new(cache_capacity),
            files_loaded: 0,
            lines_loaded: 0,
        }
    }
}

/// Scan the event logs directly inside `dir` (no subdirectories).
pub fn recover_state(dir: &Path, cache_capacity: usize) -> Result<RecoveredState, RecoveryError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err(&path))?;
        let is_match = entry.file_name().to_str().map_or(false, is_event_log_name);
        if file_type.is_file() && is_match {
            files.push(path);
        }
    }
    // Oldest backups first, active file last, so the newest lines end up most recent in the cache
    let active = active_name();
    files.sort_by_key(|path| {
        let is_active = path.file_name().and_then(|n| n.to_str()) == Some(active.as_str());
        (is_active, path.clone())
    });

    let mut state = RecoveredState::empty(cache_capacity);
    for path in files {
        log::info!("📂 Loading {}", path.display());
        let lines = load_file(&path, &mut state).map_err(io_err(&path))?;
        state.files_loaded += 1;
        state.lines_loaded += lines;
    }

    Ok(state)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RecoveryError {
    let path = path.to_path_buf();
    move |source| RecoveryError { path, source }
}

fn active_name() -> String {
    format!(
        "{}{}",
        crate::sinks::rotating_file::EVENT_LOG_PREFIX,
        crate::sinks::rotating_file::EVENT_LOG_SUFFIX
    )
}

fn load_file(path: &Path, state: &mut RecoveredState) -> std::io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;

    for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }

        if let Some(time) = RecordFields::peek(&line).and_then(|fields| fields.time) {
            if state.last_seen.map_or(true, |last| time > last) {
                state.last_seen = Some(time);
            }
        }
        state.cache.insert(digest(&line));
        count += 1;
    }

    Ok(count)
}
