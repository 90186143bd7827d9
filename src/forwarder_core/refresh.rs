//! Periodic refresh of the backend's source list
//!
//! Runs alongside the polling loop and shares nothing with it; failures are
//! only logged.

use super::main_loop::wait_for_shutdown;
use crate::backend::EventSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const SOURCE_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub async fn refresh_once(source: &dyn EventSource) -> bool {
    match source.refresh_sources().await {
        Ok(count) => {
            log::info!("🔄 Refreshed sources ({} known)", count);
            true
        }
        Err(e) => {
            log::warn!("⚠️  Error refreshing sources: {}", e);
            false
        }
    }
}

/// Refresh every `period` until shutdown is signalled. The first refresh happens one
/// period after start; callers refresh once themselves at startup.
pub async fn source_refresh_task(
    source: Arc<dyn EventSource>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("⏰ Starting source refresh task (interval: {:?})", period);

    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = timer.tick() => {
                refresh_once(source.as_ref()).await;
            }
        }
    }

    log::info!("✅ Source refresh task stopped");
}
