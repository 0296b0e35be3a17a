//! Server configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use barista_observe::DEFAULT_EVENT_LOG_CAPACITY;
use barista_session::SessionConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Realtime session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Event log settings.
    #[serde(default)]
    pub observe: ObserveConfig,

    /// Scripted session replay.
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "barista_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserveConfig {
    /// Records retained by the in-memory event log.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// A JSON-lines file of session events fed through the in-memory transport.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Script to replay at startup. No replay when unset.
    #[serde(default)]
    pub script: Option<PathBuf>,

    /// Delay between replayed events in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

fn default_pacing_ms() -> u64 {
    250
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            script: None,
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies `BARISTA_*` environment overrides (see [`apply_overrides`]).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides looked up by variable name:
///
/// - `BARISTA_HOST`, `BARISTA_PORT`
/// - `BARISTA_LOG_LEVEL`, `BARISTA_LOG_JSON` ("true" or "1" to enable)
/// - `BARISTA_MODEL`, `BARISTA_CODEC`
/// - `BARISTA_DRAIN_INTERVAL_MS`, `BARISTA_MAX_RETRIES`, `BARISTA_RETRY_DELAY_MS`
/// - `BARISTA_EVENT_LOG_CAPACITY`
/// - `BARISTA_REPLAY_SCRIPT`, `BARISTA_REPLAY_PACING_MS`
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &'static str,
    ) -> Option<T> {
        let raw = lookup(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable override");
                None
            }
        }
    }

    if let Some(host) = parsed(&lookup, "BARISTA_HOST") {
        config.server.host = host;
    }
    if let Some(port) = parsed(&lookup, "BARISTA_PORT") {
        config.server.port = port;
    }
    if let Some(level) = lookup("BARISTA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("BARISTA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(model) = lookup("BARISTA_MODEL") {
        config.session.model = model;
    }
    if let Some(codec) = parsed(&lookup, "BARISTA_CODEC") {
        config.session.codec = codec;
    }
    if let Some(ms) = parsed(&lookup, "BARISTA_DRAIN_INTERVAL_MS") {
        config.session.drain_interval_ms = ms;
    }
    if let Some(retries) = parsed(&lookup, "BARISTA_MAX_RETRIES") {
        config.session.max_retries = retries;
    }
    if let Some(ms) = parsed(&lookup, "BARISTA_RETRY_DELAY_MS") {
        config.session.retry_delay_ms = ms;
    }
    if let Some(capacity) = parsed(&lookup, "BARISTA_EVENT_LOG_CAPACITY") {
        config.observe.capacity = capacity;
    }
    if let Some(script) = lookup("BARISTA_REPLAY_SCRIPT") {
        config.replay.script = (!script.trim().is_empty()).then(|| PathBuf::from(script));
    }
    if let Some(ms) = parsed(&lookup, "BARISTA_REPLAY_PACING_MS") {
        config.replay.pacing_ms = ms;
    }
}
