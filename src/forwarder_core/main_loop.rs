//! Polling loop: sleep, compute the window, query, run the pipeline, repeat.
//!
//! The first cycle runs immediately. Query failures and timeouts skip the
//! cycle; a stream that breaks part way through keeps whatever it already
//! forwarded. Nothing short of a shutdown signal stops the loop.

use super::pipeline::{CycleStats, RecordPipeline, StreamError};
use super::window::{next_window, TimeWindow, WindowBounds};
use crate::backend::{BackendError, EventSource};
use crate::sinks::SinkFanout;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long to wait between requests
pub const REQUEST_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Sleeping,
    Querying,
    Processing,
}

#[derive(Debug)]
pub enum ForwarderError {
    Query(BackendError),
    QueryTimeout(Duration),
    Stream(StreamError),
}

impl std::fmt::Display for ForwarderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwarderError::Query(e) => write!(f, "error querying source data: {}", e),
            ForwarderError::QueryTimeout(after) => {
                write!(f, "source data query timed out after {:?}", after)
            }
            ForwarderError::Stream(e) => write!(f, "error processing records: {}", e),
        }
    }
}

impl std::error::Error for ForwarderError {}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub request_delay: Duration,
    pub query_timeout: Duration,
    pub bounds: WindowBounds,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            request_delay: REQUEST_DELAY,
            query_timeout: Duration::from_secs(300),
            bounds: WindowBounds::default(),
        }
    }
}

/// Resolves once `true` is sent on the channel or every sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Waits for `signal`, then stops the loop behind `forwarder` and waits for it.
///
/// If the signal itself fails the loop keeps running until it ends on its own.
pub async fn run_until_signal<F>(
    signal: F,
    forwarder: JoinHandle<()>,
    shutdown: &watch::Sender<bool>,
) where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            log::info!("⚠️  Received CTRL+C, shutting down...");
            let _ = shutdown.send(true);
        }
        Err(e) => log::error!("❌ Failed to listen for CTRL+C: {}", e),
    }
    if let Err(e) = forwarder.await {
        log::error!("❌ Forwarder task failed: {}", e);
    }
    let _ = shutdown.send(true);
}

pub struct Forwarder {
    source: Arc<dyn EventSource>,
    sinks: SinkFanout,
    pipeline: RecordPipeline,
    settings: LoopSettings,
    state: LoopState,
}

impl Forwarder {
    pub fn new(
        source: Arc<dyn EventSource>,
        sinks: SinkFanout,
        pipeline: RecordPipeline,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            sinks,
            pipeline,
            settings,
            state: LoopState::Starting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn pipeline(&self) -> &RecordPipeline {
        &self.pipeline
    }

    fn transition(&mut self, next: LoopState) {
        log::debug!("🔁 {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Window the next cycle would query at `now`.
    pub fn next_window(&self, now: DateTime<Utc>) -> TimeWindow {
        next_window(self.pipeline.last_seen(), now, &self.settings.bounds)
    }

    /// One query + processing pass. Always ends in `Sleeping`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleStats, ForwarderError> {
        self.transition(LoopState::Querying);
        let window = self.next_window(now);

        let query = self.source.query(window.start, window.end);
        let stream = match tokio::time::timeout(self.settings.query_timeout, query).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.transition(LoopState::Sleeping);
                return Err(ForwarderError::Query(e));
            }
            Err(_) => {
                self.transition(LoopState::Sleeping);
                return Err(ForwarderError::QueryTimeout(self.settings.query_timeout));
            }
        };

        self.transition(LoopState::Processing);
        let result = self
            .pipeline
            .process_stream(stream, self.source.as_ref(), &mut self.sinks, now)
            .await;
        self.transition(LoopState::Sleeping);

        result.map_err(ForwarderError::Stream)
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "🚀 Starting forwarder loop (delay: {:?}, sinks: {:?})",
            self.settings.request_delay,
            self.sinks.backend_types()
        );

        loop {
            if self.state != LoopState::Starting {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = tokio::time::sleep(self.settings.request_delay) => {}
                }
            }

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = self.run_cycle(Utc::now()) => {
                    if let Err(e) = result {
                        log::warn!("⚠️  {}", e);
                    }
                }
            }
        }

        self.sinks.flush().await;
        log::info!("✅ Forwarder loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder_core::filter::FilterSet;
    use crate::forwarder_core::recency_cache::RecencyCache;
    use crate::forwarder_core::record::RecordTime;
    use crate::forwarder_core::test_support::{CaptureSink, Response, ScriptedSource};
    use std::sync::Mutex;

    fn forwarder(
        source: Arc<ScriptedSource>,
        settings: LoopSettings,
    ) -> (Forwarder, Arc<Mutex<Vec<String>>>) {
        let (sink, lines) = CaptureSink::new();
        let pipeline = RecordPipeline::new(RecencyCache::new(100), None, FilterSet::default());
        let forwarder = Forwarder::new(
            source,
            SinkFanout::new(vec![Box::new(sink)]),
            pipeline,
            settings,
        );
        (forwarder, lines)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cycles_follow_last_seen() {
        let now = 1_700_000_000;
        let source = Arc::new(ScriptedSource::new().with_responses(vec![
            Response::Body(format!("{{\"time\":{}}}\n", now - 1_200).into_bytes()),
            Response::Body(Vec::new()),
        ]));
        let (mut forwarder, lines) = forwarder(source.clone(), LoopSettings::default());
        assert_eq!(forwarder.state(), LoopState::Starting);

        let stats = forwarder.run_cycle(at(now)).await.unwrap();
        assert_eq!(stats.new_records, 1);
        assert_eq!(forwarder.state(), LoopState::Sleeping);
        assert_eq!(forwarder.pipeline().last_seen(), Some(RecordTime((now - 1_200) as f64)));

        forwarder.run_cycle(at(now + 30)).await.unwrap();

        let windows = source.windows.lock().unwrap().clone();
        assert_eq!(windows[0], (at(now - 3_600), at(now)));
        assert_eq!(windows[1], (at(now - 1_200), at(now + 30)));
        assert_eq!(lines.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_error_leaves_state_untouched() {
        let source = Arc::new(ScriptedSource::new().with_responses(vec![Response::Fail]));
        let (mut forwarder, lines) = forwarder(source, LoopSettings::default());

        let err = forwarder.run_cycle(at(1_700_000_000)).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Query(_)));
        assert_eq!(forwarder.state(), LoopState::Sleeping);
        assert_eq!(forwarder.pipeline().last_seen(), None);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_timeout_is_bounded() {
        let source = Arc::new(ScriptedSource::new().with_responses(vec![Response::Hang]));
        let settings = LoopSettings {
            query_timeout: Duration::from_millis(20),
            ..LoopSettings::default()
        };
        let (mut forwarder, _) = forwarder(source, settings);

        let err = forwarder.run_cycle(Utc::now()).await.unwrap_err();
        assert!(matches!(err, ForwarderError::QueryTimeout(_)));
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_results() {
        let source = Arc::new(ScriptedSource::new().with_responses(vec![
            Response::BrokenBody(b"{\"time\":5,\"id\":\"a\"}\n".to_vec()),
        ]));
        let (mut forwarder, lines) = forwarder(source, LoopSettings::default());

        let err = forwarder.run_cycle(Utc::now()).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Stream(_)));
        assert_eq!(lines.lock().unwrap().len(), 1);
        assert_eq!(forwarder.pipeline().last_seen(), Some(RecordTime(5.0)));
    }

    #[tokio::test]
    async fn test_run_survives_errors_until_shutdown() {
        let source = Arc::new(ScriptedSource::new().with_responses(vec![
            Response::Fail,
            Response::Body(b"{\"id\":\"a\"}\n".to_vec()),
            Response::Body(b"{\"id\":\"a\"}\n{\"id\":\"b\"}\n".to_vec()),
        ]));
        let settings = LoopSettings {
            request_delay: Duration::from_millis(10),
            ..LoopSettings::default()
        };
        let (forwarder, lines) = forwarder(source.clone(), settings);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(forwarder.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while lines.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            *lines.lock().unwrap(),
            vec!["{\"id\":\"a\"}".to_string(), "{\"id\":\"b\"}".to_string()]
        );
        assert!(source.windows.lock().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn test_signal_stops_the_loop() {
        let source = Arc::new(ScriptedSource::new());
        let (forwarder, _) = forwarder(source, LoopSettings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(forwarder.run(shutdown_rx));

        tokio::time::timeout(
            Duration::from_secs(5),
            run_until_signal(async { Ok(()) }, handle, &shutdown_tx),
        )
        .await
        .unwrap();
        assert!(*shutdown_tx.borrow());
    }

    #[tokio::test]
    async fn test_failed_signal_keeps_the_loop_running() {
        let source = Arc::new(ScriptedSource::new());
        let settings = LoopSettings {
            request_delay: Duration::from_millis(10),
            ..LoopSettings::default()
        };
        let (forwarder, _) = forwarder(source.clone(), settings);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(forwarder.run(shutdown_rx));

        let no_signal = async {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "no signal handler",
            ))
        };
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            run_until_signal(no_signal, handle, &shutdown_tx),
        )
        .await;

        assert!(waited.is_err(), "loop must outlive a failed signal handler");
        assert!(!*shutdown_tx.borrow());
        assert!(source.windows.lock().unwrap().len() >= 2);
    }
}
