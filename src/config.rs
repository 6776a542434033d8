//! Configuration loading for the radar bridge.
//!
//! Loads `radarwatch.toml` with per-section defaults. All sections use
//! `#[serde(default)]` so a minimal or empty config file is valid, and a
//! missing file means "all defaults".
//!
//! Precedence: env vars > config file > defaults. Env vars are read once
//! here; components receive the resolved record.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::notify::telegram::DEFAULT_API_BASE;

/// Env var naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "RADARWATCH_CONFIG_PATH";

/// Config file used when nothing else is specified.
pub const DEFAULT_CONFIG_FILE: &str = "radarwatch.toml";

/// An env override whose value could not be parsed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    /// Variable name.
    pub var: &'static str,
    /// The rejected value.
    pub value: String,
}

impl std::fmt::Display for IgnoredOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.var, self.value)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RadarwatchConfig {
    /// Serial device settings.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Downstream visualizer socket.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Alert gating.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Telegram notification settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Persisted key-value store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial device settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/ttyUSB0`, `COM3`).
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Line speed.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout; bounds how long the reader goes without checking for shutdown.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Delay after opening before the first read, while the board resets.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// Downstream visualizer socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Listen address for the single visualizer connection.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Alert gating.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Minimum seconds between two dispatched alerts.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Telegram notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Store key holding the bot token.
    #[serde(default = "default_bot_token_key")]
    pub bot_token_key: String,

    /// Store key holding the comma-separated recipient list.
    #[serde(default = "default_recipients_key")]
    pub recipients_key: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Query `getUpdates` at startup for new recipients.
    #[serde(default = "default_true")]
    pub discover: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token_key: default_bot_token_key(),
            recipients_key: default_recipients_key(),
            request_timeout_secs: default_request_timeout_secs(),
            discover: true,
        }
    }
}

/// Persisted key-value store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// dotenv file holding the bot token and recipient list.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rotated JSON logs.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl RadarwatchConfig {
    /// Parse a TOML string (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply env overrides through a resolver.
    ///
    /// Takes the resolver as a closure so tests never touch the process
    /// environment. Unparsable numeric overrides are skipped and returned so
    /// the caller can report them once logging is up.
    pub fn apply_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Vec<IgnoredOverride> {
        let mut ignored = Vec::new();
        if let Some(v) = env("RADARWATCH_SERIAL_PORT") {
            self.serial.port = v;
        }
        if let Some(v) = env("RADARWATCH_BAUD_RATE") {
            match v.parse() {
                Ok(n) => self.serial.baud_rate = n,
                Err(_) => ignored.push(IgnoredOverride {
                    var: "RADARWATCH_BAUD_RATE",
                    value: v,
                }),
            }
        }
        if let Some(v) = env("RADARWATCH_BIND") {
            self.forward.bind = v;
        }
        if let Some(v) = env("RADARWATCH_COOLDOWN_SECS") {
            match v.parse() {
                Ok(n) => self.alerts.cooldown_secs = n,
                Err(_) => ignored.push(IgnoredOverride {
                    var: "RADARWATCH_COOLDOWN_SECS",
                    value: v,
                }),
            }
        }
        if let Some(v) = env("RADARWATCH_ENV_FILE") {
            self.store.env_file = PathBuf::from(v);
        }
        ignored
    }

    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.serial.port.is_empty(), "serial.port must not be empty");
        anyhow::ensure!(self.serial.baud_rate > 0, "serial.baud_rate must be > 0");
        anyhow::ensure!(
            (1..=1000).contains(&self.serial.read_timeout_ms),
            "serial.read_timeout_ms must be in [1, 1000]"
        );
        self.bind_addr()?;
        anyhow::ensure!(
            self.telegram.api_base.starts_with("http://")
                || self.telegram.api_base.starts_with("https://"),
            "telegram.api_base must be an http(s) URL"
        );
        anyhow::ensure!(
            !self.telegram.bot_token_key.is_empty() && !self.telegram.recipients_key.is_empty(),
            "telegram store keys must not be empty"
        );
        anyhow::ensure!(
            self.telegram.request_timeout_secs > 0,
            "telegram.request_timeout_secs must be > 0"
        );
        Ok(())
    }

    /// Parsed listen address for the visualizer socket.
    ///
    /// # Errors
    ///
    /// Returns an error if `forward.bind` is not `host:port`.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.forward
            .bind
            .parse()
            .with_context(|| format!("forward.bind is not a socket address: {}", self.forward.bind))
    }
}

/// Resolve which config file to load: explicit path, then env var, then default.
pub fn config_path(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Some(p) = env(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Load and validate a config file, applying `env` overrides.
///
/// A missing file yields defaults. Overrides that could not be parsed are
/// returned alongside the config for the caller to log.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if
/// validation fails.
pub fn load_config(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<(RadarwatchConfig, Vec<IgnoredOverride>)> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => RadarwatchConfig::from_toml(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RadarwatchConfig::default(),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config {}", path.display()))
        }
    };

    let ignored = config.apply_overrides(env);
    config.validate()?;
    Ok((config, ignored))
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_owned()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_bind() -> String {
    "127.0.0.1:65432".to_owned()
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_owned()
}

fn default_bot_token_key() -> String {
    "TELEGRAM_BOT_TOKEN".to_owned()
}

fn default_recipients_key() -> String {
    "TELEGRAM_CHAT_ID".to_owned()
}

fn default_request_timeout_secs() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_owned()
}
