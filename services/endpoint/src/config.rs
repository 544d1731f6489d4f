//! Endpoint configuration loading.
//!
//! The config document is JSON by default (`endpoint_config.json` in the
//! working directory); a path ending in `.toml` is parsed as TOML instead.
//! There are no environment variable overrides.
//!
//! # Fields
//! - `address`, `port`: coordinator host and port.
//! - `targets`: identity key -> `{ name, mac, ip }`, kept in document order.
//! - `secure` (optional, default `true`): `false` connects with `ws://`.
//! - `timing` (optional): millisecond overrides for the scheduler and
//!   reconnect constants.
//!
//! A missing file is created with defaults. A corrupt file never stops the
//! endpoint: [`load_or_create`] falls back to defaults and hands the error
//! back for the caller to report.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "endpoint_config.json";

const DEFAULT_ADDRESS: &str = "hostname.com";
const DEFAULT_PORT: u16 = 1234;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub address: String,
    pub port: u16,
    pub secure: bool,
    pub targets: Vec<TargetConfig>,
    pub timing: TimingConfig,
}

/// One entry of the `targets` map.
///
/// Fields are kept optional here; the registry decides which entries are
/// usable (an entry without a valid `mac` is skipped there).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub key: String,
    pub name: Option<String>,
    pub mac: Option<String>,
    pub ip: Option<String>,
}

/// Scheduler and reconnect timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Fixed delay between a lost (or failed) channel and the next attempt.
    pub reconnect_backoff: Duration,
    /// Upper bound for a single echo probe.
    pub probe_timeout: Duration,
    /// Minimum time between two full sweeps of the registry.
    pub sweep_interval: Duration,
    /// Sleep between scheduler iterations.
    pub scheduler_tick: Duration,
    /// Sleep while the bound channel is not open.
    pub idle_recheck: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(10),
            scheduler_tick: Duration::from_secs(1),
            idle_recheck: Duration::from_secs(5),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            port: DEFAULT_PORT,
            secure: true,
            targets: Vec::new(),
            timing: TimingConfig::default(),
        }
    }
}

impl EndpointConfig {
    /// The control channel URL, e.g.
    /// `wss://hostname.com:1234/?tgt=remote_boot&client_type=endpoint`.
    pub fn channel_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/?{}",
            scheme,
            self.address,
            self.port,
            rb_protocol::ENDPOINT_QUERY
        )
    }
}

// ---------------------------------------------------------------------------
// Raw deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    address: Option<String>,
    port: Option<Value>,
    secure: Option<bool>,
    targets: Option<serde_json::Map<String, Value>>,
    timing: Option<RawTimingConfig>,
}

#[derive(Debug, Deserialize)]
struct RawTimingConfig {
    reconnect_backoff_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
    scheduler_tick_ms: Option<u64>,
    idle_recheck_ms: Option<u64>,
}

/// Shape of the document written when no config file exists.
#[derive(Debug, Serialize)]
struct DefaultDocument {
    address: &'static str,
    port: u16,
    targets: serde_json::Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Document syntax, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Result of [`load_or_create`]: the config to run with, plus what happened
/// on the way.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: EndpointConfig,
    /// True when the file did not exist and a default document was written.
    pub created: bool,
    /// Set when the file could not be read, parsed or (re)created. `config`
    /// then holds the defaults.
    pub error: Option<ConfigError>,
}

/// Load the config at `path`, creating a default document if it is missing.
///
/// Never fails: any error is reported through [`LoadedConfig::error`] and the
/// defaults are used for this run.
pub fn load_or_create(path: &Path) -> LoadedConfig {
    let mut created = false;
    if !path.exists() {
        if let Err(e) = write_default(path) {
            return LoadedConfig {
                config: EndpointConfig::default(),
                created,
                error: Some(e),
            };
        }
        created = true;
    }

    match load_config_from_path(path) {
        Ok(config) => LoadedConfig {
            config,
            created,
            error: None,
        },
        Err(e) => LoadedConfig {
            config: EndpointConfig::default(),
            created,
            error: Some(e),
        },
    }
}

/// Write the default config document to `path`.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    let doc = DefaultDocument {
        address: DEFAULT_ADDRESS,
        port: DEFAULT_PORT,
        targets: serde_json::Map::new(),
    };
    let text = match ConfigFormat::for_path(path) {
        ConfigFormat::Json => serde_json::to_string_pretty(&doc)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        ConfigFormat::Toml => {
            toml::to_string(&doc).map_err(|e| ConfigError::Serialize(e.to_string()))?
        }
    };
    std::fs::write(path, text)
        .map_err(|e| ConfigError::Io(format!("writing config file '{}': {}", path.display(), e)))
}

/// Load endpoint config from a path; the format follows the extension.
pub fn load_config_from_path(path: &Path) -> Result<EndpointConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&text, ConfigFormat::for_path(path))
}

/// Load endpoint config from a string.
pub fn load_config_from_str(text: &str, format: ConfigFormat) -> Result<EndpointConfig, ConfigError> {
    let raw: RawConfig = match format {
        ConfigFormat::Json => {
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        ConfigFormat::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };

    let defaults = EndpointConfig::default();

    let port = match raw.port {
        None => defaults.port,
        Some(v) => parse_port(&v)?,
    };

    let targets = raw
        .targets
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| target_from_value(key, &value))
        .collect();

    let timing = match raw.timing {
        Some(t) => {
            let d = TimingConfig::default();
            TimingConfig {
                reconnect_backoff: ms_or(t.reconnect_backoff_ms, d.reconnect_backoff),
                probe_timeout: ms_or(t.probe_timeout_ms, d.probe_timeout),
                sweep_interval: ms_or(t.sweep_interval_ms, d.sweep_interval),
                scheduler_tick: ms_or(t.scheduler_tick_ms, d.scheduler_tick),
                idle_recheck: ms_or(t.idle_recheck_ms, d.idle_recheck),
            }
        }
        None => TimingConfig::default(),
    };
    if timing.probe_timeout.is_zero() {
        return Err(ConfigError::InvalidValue(
            "timing.probe_timeout_ms must be greater than 0".to_owned(),
        ));
    }

    Ok(EndpointConfig {
        address: raw.address.unwrap_or(defaults.address),
        port,
        secure: raw.secure.unwrap_or(true),
        targets,
        timing,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ports are accepted as a number or a numeric string (`"1234"`).
fn parse_port(value: &Value) -> Result<u16, ConfigError> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    match port {
        Some(p) if p != 0 => Ok(p),
        _ => Err(ConfigError::InvalidValue(format!("invalid port: {}", value))),
    }
}

fn target_from_value(key: String, value: &Value) -> TargetConfig {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    TargetConfig {
        name: field("name"),
        mac: field("mac"),
        ip: field("ip"),
        key,
    }
}

fn ms_or(ms: Option<u64>, default: Duration) -> Duration {
    ms.map(Duration::from_millis).unwrap_or(default)
}
