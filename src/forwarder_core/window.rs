//! Sliding query window
//!
//! Every cycle queries `[start, now)`. The start follows the most recent record
//! seen, but is clamped so that the window always re-covers a trailing overlap
//! band and never reaches back further than `max_lookback`.

use super::record::RecordTime;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowBounds {
    /// Lookback used before any record has been seen
    pub default_lookback: Duration,
    /// Always look at least this far into the past
    pub min_query_overlap: Duration,
    /// Never look further than this into the past
    pub max_lookback: Duration,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            default_lookback: Duration::hours(1),
            min_query_overlap: Duration::minutes(5),
            max_lookback: Duration::hours(4),
        }
    }
}

/// Compute the window for the next query.
pub fn next_window(
    last_seen: Option<RecordTime>,
    now: DateTime<Utc>,
    bounds: &WindowBounds,
) -> TimeWindow {
    let mut start = last_seen
        .and_then(RecordTime::to_datetime)
        .unwrap_or(now - bounds.default_lookback);

    let latest_start = now - bounds.min_query_overlap;
    let earliest_start = now - bounds.max_lookback;
    if start > latest_start {
        start = latest_start;
    } else if start < earliest_start {
        start = earliest_start;
    }

    TimeWindow { start, end: now }
}
