//! # Event Forwarder
//!
//! Unattended agent that polls a remote event source for security telemetry,
//! drops the duplicates produced by overlapping query windows and forwards every
//! unique record to the configured sinks (rotating file, console, local syslog).
//!
//! ## Module Organization
//!
//! - `config` - Environment-driven configuration
//! - `backend` - Event source trait and the HTTP client implementing it
//! - `sinks` - Output sinks and the fan-out writer
//! - `forwarder_core` - Recency cache, recovery, window scheduler, record pipeline, main loop

pub mod backend;
pub mod config;
pub mod forwarder_core;
pub mod sinks;

pub use config::{ConfigError, ForwarderConfig};
