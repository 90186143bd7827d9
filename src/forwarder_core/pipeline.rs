//! Record pipeline
//!
//! Consumes one query response line by line:
//!
//! 1. digest the raw bytes and drop anything already in the recency cache
//! 2. ratchet the last-seen record time forward
//! 3. augment the record through the event source
//! 4. validate the result as JSON (invalid records only go to the error log)
//! 5. apply the filter set, annotate with a linkback and hand off to the sinks,
//!    once per matching filter
//!
//! Duplicates are judged on the bytes as received, before augmentation.

use super::filter::FilterSet;
use super::linkback::Linkback;
use super::recency_cache::RecencyCache;
use super::record::{digest, is_valid_json, snippet, RecordFields, RecordTime};
use crate::backend::EventSource;
use crate::sinks::SinkFanout;
use chrono::{DateTime, Utc};
use futures::io::{AsyncBufRead, AsyncBufReadExt};

const INVALID_SNIPPET_BYTES: usize = 1024;

/// Per-stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Non-empty lines read from the stream
    pub records_read: usize,
    /// Lines not seen before
    pub new_records: usize,
    /// Lines delivered to the sinks (a record may count once per matching filter)
    pub emitted: usize,
    /// New lines dropped because they were not valid JSON
    pub invalid: usize,
}

/// A stream that failed part way through. Records before the failure were
/// already forwarded.
#[derive(Debug)]
pub struct StreamError {
    pub stats: CycleStats,
    pub source: std::io::Error,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stream failed after {} records ({} new): {}",
            self.stats.records_read, self.stats.new_records, self.source
        )
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub struct RecordPipeline {
    cache: RecencyCache,
    last_seen: Option<RecordTime>,
    filters: FilterSet,
    linkback: Option<Linkback>,
    report_lag: bool,
}

impl RecordPipeline {
    pub fn new(cache: RecencyCache, last_seen: Option<RecordTime>, filters: FilterSet) -> Self {
        Self {
            cache,
            last_seen,
            filters,
            linkback: None,
            report_lag: true,
        }
    }

    pub fn with_linkback(mut self, linkback: Option<Linkback>) -> Self {
        self.linkback = linkback;
        self
    }

    /// Turn off the per-stream lag report (used when events go to stdout).
    pub fn with_lag_report(mut self, enabled: bool) -> Self {
        self.report_lag = enabled;
        self
    }

    pub fn last_seen(&self) -> Option<RecordTime> {
        self.last_seen
    }

    pub fn cache(&self) -> &RecencyCache {
        &self.cache
    }

    /// Run every line of `stream` through the pipeline.
    pub async fn process_stream<R>(
        &mut self,
        mut stream: R,
        source: &dyn EventSource,
        sinks: &mut SinkFanout,
        now: DateTime<Utc>,
    ) -> Result<CycleStats, StreamError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = CycleStats::default();

        let result = loop {
            let mut line = Vec::new();
            match stream.read_until(b'\n', &mut line).await {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    if line.last() == Some(&b'\n') {
                        line.pop();
                    }
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    stats.records_read += 1;
                    self.process_line(line, source, sinks, &mut stats).await;
                }
                Err(e) => break Err(e),
            }
        };

        sinks.flush().await;
        self.report(&stats, now);

        match result {
            Ok(()) => Ok(stats),
            Err(source) => Err(StreamError { stats, source }),
        }
    }

    async fn process_line(
        &mut self,
        mut record: Vec<u8>,
        source: &dyn EventSource,
        sinks: &mut SinkFanout,
        stats: &mut CycleStats,
    ) {
        let key = digest(&record);
        if self.cache.contains(&key) {
            return;
        }
        self.cache.insert(key);
        stats.new_records += 1;

        let fields = RecordFields::peek(&record);
        if let Some(time) = fields.as_ref().and_then(|f| f.time) {
            if self.last_seen.map_or(true, |last| time > last) {
                self.last_seen = Some(time);
            }
        }

        if let Some(muid) = fields.as_ref().and_then(|f| f.muid.as_deref()) {
            source.augment(&mut record, muid);
        }

        let text = match std::str::from_utf8(&record) {
            Ok(text) if is_valid_json(&record) => text,
            _ => {
                stats.invalid += 1;
                log::error!("❌ Invalid record: {}", snippet(&record, INVALID_SNIPPET_BYTES));
                return;
            }
        };

        let matches = self.filters.match_count(text);
        if matches == 0 {
            return;
        }

        let mut line = record.clone();
        if let Some(linkback) = &self.linkback {
            // Field values after augmentation
            let fields = RecordFields::peek(&record).unwrap_or_default();
            linkback.annotate(&mut line, &fields);
        }
        let line = String::from_utf8_lossy(&line);

        for _ in 0..matches {
            sinks.write_line(&line).await;
            stats.emitted += 1;
        }
    }

    fn report(&self, stats: &CycleStats, now: DateTime<Utc>) {
        log::info!("📊 {}", self.summary(stats, now));
    }

    /// Per-stream counts, plus the lag behind the newest record when enabled.
    fn summary(&self, stats: &CycleStats, now: DateTime<Utc>) -> String {
        let counts = format!(
            "{} new records ({} read)",
            stats.new_records, stats.records_read
        );
        if !self.report_lag {
            return counts;
        }
        match self.last_seen.and_then(RecordTime::to_datetime) {
            Some(last) => format!(
                "{}, most recent {}s ago",
                counts,
                (now - last).num_seconds()
            ),
            None => format!("{}, no record time seen yet", counts),
        }
    }
}
