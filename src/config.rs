use crate::forwarder_core::filter::FilterSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub api_host: String,
    pub api_key: String,
    pub org_uid: String,
    /// Directory holding the rotated event logs (also scanned on startup)
    pub log_path: PathBuf,
    pub local_syslog_forwarding: bool,
    /// Mirror events to stdout; also silences the per-cycle lag report
    pub stdout: bool,
    pub filters: FilterSet,
    pub linkback: bool,
    pub ui_url: Option<String>,
    pub output_max_size_mb: u64,
    pub output_max_backups: usize,
    pub query_timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ForwarderConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `API_HOST` (required, http:// or https://)
    /// - `API_KEY` (required)
    /// - `ORG_UID` (required)
    /// - `LOG_PATH` (default: ./logs)
    /// - `LOCAL_SYSLOG_FORWARDING` (default: false)
    /// - `STDOUT` (default: false)
    /// - `FILTER_EXPRESSIONS` (JSON array of regexes, default: none)
    /// - `LINKBACK` (default: false)
    /// - `UI_URL` (required when LINKBACK=true)
    /// - `OUTPUT_MAX_SIZE_MB` (default: 10)
    /// - `OUTPUT_MAX_BACKUPS` (default: 5)
    /// - `QUERY_TIMEOUT_SECS` (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };

        let api_host = require("API_HOST")?.trim_end_matches('/').to_string();
        if !api_host.starts_with("http://") && !api_host.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_HOST must start with http:// or https://".to_string(),
            ));
        }

        let api_key = require("API_KEY")?;
        let org_uid = require("ORG_UID")?;

        let log_path = PathBuf::from(lookup("LOG_PATH").unwrap_or_else(|| "./logs".to_string()));

        let local_syslog_forwarding = parse_bool(&lookup, "LOCAL_SYSLOG_FORWARDING")?;
        let stdout = parse_bool(&lookup, "STDOUT")?;
        let linkback = parse_bool(&lookup, "LINKBACK")?;

        let expressions: Vec<String> = match lookup("FILTER_EXPRESSIONS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "FILTER_EXPRESSIONS must be a JSON array of strings: {}",
                    e
                ))
            })?,
            _ => Vec::new(),
        };
        let filters = FilterSet::compile(&expressions)
            .map_err(|e| ConfigError::InvalidValue(format!("bad filter expression: {}", e)))?;

        let ui_url = lookup("UI_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string());
        if linkback && ui_url.is_none() {
            return Err(ConfigError::MissingVariable("UI_URL".to_string()));
        }

        let output_max_size_mb = lookup("OUTPUT_MAX_SIZE_MB")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let output_max_backups = lookup("OUTPUT_MAX_BACKUPS")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(5);

        let query_timeout = Duration::from_secs(
            lookup("QUERY_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(300),
        );

        Ok(Self {
            api_host,
            api_key,
            org_uid,
            log_path,
            local_syslog_forwarding,
            stdout,
            filters,
            linkback,
            ui_url,
            output_max_size_mb,
            output_max_backups,
            query_timeout,
        })
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "" | "false" | "0" | "no" => Ok(false),
            "true" | "1" | "yes" => Ok(true),
            other => Err(ConfigError::InvalidValue(format!(
                "{} must be a boolean, got '{}'",
                key, other
            ))),
        },
    }
}
