//! Event Forwarder agent
//!
//! Polls the event backend every 30s and forwards each unique record to the
//! rotating event log (plus stdout and local syslog when enabled).
//!
//! Usage:
//!   cargo run --release --bin event_forwarder
//!
//! Configuration comes from the environment (a `.env` file is honoured);
//! see `ForwarderConfig::from_env` for the full list.

use dotenv::dotenv;
use event_forwarder::backend::{EventSource, HttpEventSource};
use event_forwarder::config::ForwarderConfig;
use event_forwarder::forwarder_core::{
    linkback::Linkback, recover_state, refresh_once, run_until_signal, source_refresh_task,
    Forwarder, LoopSettings, RecordPipeline, RecoveredState, DEDUP_CACHE_ELEMENTS,
    SOURCE_REFRESH_INTERVAL,
};
use event_forwarder::sinks::{ConsoleSink, RotatingFileSink, Sink, SinkFanout};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!(
        "🚀 Starting event-forwarder {} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH
    );

    let config = match ForwarderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Fatal: {}", e);
            return Err(e.into());
        }
    };

    info!("📊 Configuration:");
    info!("   ├─ Org UID: {}", config.org_uid);
    info!("   ├─ API host: {}", config.api_host);
    info!("   ├─ Log path: {}", config.log_path.display());
    info!("   ├─ Local syslog forwarding: {}", config.local_syslog_forwarding);
    info!("   ├─ Stdout: {}", config.stdout);
    info!("   ├─ Filters: {}", config.filters.len());
    info!("   └─ Linkback: {}", config.linkback);
    for var in ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"] {
        if let Ok(value) = std::env::var(var) {
            info!("   {}: {}", var.to_lowercase().replace('_', " "), value);
        }
    }

    // Recovery failure is never fatal
    let recovery_dir = config.log_path.clone();
    let recovered = match tokio::task::spawn_blocking(move || {
        recover_state(&recovery_dir, DEDUP_CACHE_ELEMENTS)
    })
    .await
    {
        Ok(Ok(state)) => {
            info!(
                "✅ Recovered {} records from {} files",
                state.lines_loaded, state.files_loaded
            );
            state
        }
        Ok(Err(e)) => {
            warn!("⚠️  Error loading state (ignored): {}", e);
            RecoveredState::empty(DEDUP_CACHE_ELEMENTS)
        }
        Err(e) => {
            warn!("⚠️  State loading task failed (ignored): {}", e);
            RecoveredState::empty(DEDUP_CACHE_ELEMENTS)
        }
    };

    let mut sinks = SinkFanout::default();
    sinks.push(Box::new(RotatingFileSink::new(
        &config.log_path,
        config.output_max_size_mb,
        config.output_max_backups,
    )?));
    if config.stdout {
        sinks.push(Box::new(ConsoleSink::new()));
    }
    if config.local_syslog_forwarding {
        if let Some(sink) = syslog_sink() {
            sinks.push(sink);
        }
    }

    let source: Arc<dyn EventSource> = Arc::new(HttpEventSource::from_config(&config)?);
    refresh_once(source.as_ref()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_handle = tokio::spawn(source_refresh_task(
        source.clone(),
        SOURCE_REFRESH_INTERVAL,
        shutdown_rx.clone(),
    ));

    let pipeline = RecordPipeline::new(recovered.cache, recovered.last_seen, config.filters.clone())
        .with_linkback(Linkback::from_config(&config))
        .with_lag_report(!config.stdout);
    let settings = LoopSettings {
        query_timeout: config.query_timeout,
        ..LoopSettings::default()
    };
    let forwarder = Forwarder::new(source, sinks, pipeline, settings);
    let forwarder_handle = tokio::spawn(forwarder.run(shutdown_rx));

    info!("🔄 Press CTRL+C to shutdown gracefully");
    run_until_signal(tokio::signal::ctrl_c(), forwarder_handle, &shutdown_tx).await;
    let _ = refresh_handle.await;

    info!("✅ Event forwarder stopped");
    Ok(())
}

#[cfg(unix)]
fn syslog_sink() -> Option<Box<dyn Sink>> {
    use event_forwarder::sinks::{syslog::SYSLOG_TAG, SyslogSink};

    match SyslogSink::connect_local(SYSLOG_TAG) {
        Ok(sink) => Some(Box::new(sink)),
        Err(e) => {
            warn!("⚠️  Syslog forwarding requested, but failed: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn syslog_sink() -> Option<Box<dyn Sink>> {
    warn!("⚠️  Syslog forwarding requested, but not supported on this platform");
    None
}
