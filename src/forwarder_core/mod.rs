//! # Forwarder Core
//!
//! The ingestion pipeline:
//!
//! - `recency_cache` - Bounded LRU set of record digests used for dedup
//! - `recovery` - Rebuilds the cache and last-seen time from prior output
//! - `window` - Sliding query window computation
//! - `record` - Lenient field access, digests and JSON helpers
//! - `filter` - Regex filter set
//! - `linkback` - Console link annotation
//! - `pipeline` - Per-stream dedup → augment → validate → filter → emit
//! - `main_loop` - Poll/process state machine
//! - `refresh` - Background source-list refresh

pub mod filter;
pub mod linkback;
pub mod main_loop;
pub mod pipeline;
pub mod recency_cache;
pub mod record;
pub mod recovery;
pub mod refresh;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;

pub use filter::FilterSet;
pub use main_loop::{
    run_until_signal, wait_for_shutdown, Forwarder, ForwarderError, LoopSettings, LoopState,
    REQUEST_DELAY,
};
pub use pipeline::{CycleStats, RecordPipeline};
pub use recency_cache::{RecencyCache, DEDUP_CACHE_ELEMENTS};
pub use record::RecordTime;
pub use recovery::{recover_state, RecoveredState, RecoveryError};
pub use refresh::{refresh_once, source_refresh_task, SOURCE_REFRESH_INTERVAL};
pub use window::{next_window, TimeWindow, WindowBounds};
