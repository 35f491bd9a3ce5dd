//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.agent-bridge/config.json`) and then
//! overridden from the environment. The two secrets (chat token, backend API key)
//! are normally supplied only through the environment or a `.env` file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_MATTERMOST_URL: &str = "MATTERMOST_URL";
pub const ENV_MATTERMOST_PORT: &str = "MATTERMOST_PORT";
pub const ENV_MATTERMOST_SCHEME: &str = "MATTERMOST_SCHEME";
pub const ENV_MATTERMOST_TOKEN: &str = "MATTERMOST_TOKEN";
pub const ENV_BACKEND_URL: &str = "AGENT_ZERO_URL";
pub const ENV_BACKEND_API_KEY: &str = "AGENT_ZERO_API_KEY";
pub const ENV_BACKEND_TIMEOUT: &str = "AGENT_ZERO_TIMEOUT";
pub const ENV_RECONNECT_DELAY: &str = "RECONNECT_DELAY";
pub const ENV_MAX_RECONNECT_DELAY: &str = "MAX_RECONNECT_DELAY";
pub const ENV_SHUTDOWN_GRACE: &str = "SHUTDOWN_GRACE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat transport connection settings.
    #[serde(default)]
    pub mattermost: MattermostConfig,

    /// Conversational backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Reconnect backoff bounds.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// How long shutdown waits for logout and in-flight replies (default 10).
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Default log filter when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Mattermost server address and bot token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MattermostConfig {
    /// Host name without scheme or port.
    #[serde(default = "default_mattermost_url")]
    pub url: String,

    #[serde(default = "default_mattermost_port")]
    pub port: u16,

    /// "http" or "https". Selects ws/wss for the event stream.
    #[serde(default = "default_mattermost_scheme")]
    pub scheme: String,

    /// Bot or personal access token. Overridden by MATTERMOST_TOKEN env.
    pub token: Option<String>,
}

/// Backend base URL, API key and request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Sent as X-API-KEY. Overridden by AGENT_ZERO_API_KEY env.
    pub api_key: Option<String>,

    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

/// Exponential backoff bounds for reconnecting the event stream, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_mattermost_url() -> String {
    "mattermost.house.svc.cluster.local".to_string()
}

fn default_mattermost_port() -> u16 {
    8065
}

fn default_mattermost_scheme() -> String {
    "http".to_string()
}

fn default_backend_url() -> String {
    "http://agent-zero.house.svc.cluster.local".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    120
}

fn default_min_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            url: default_mattermost_url(),
            port: default_mattermost_port(),
            scheme: default_mattermost_scheme(),
            token: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: None,
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mattermost: MattermostConfig::default(),
            backend: BackendConfig::default(),
            reconnect: ReconnectConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            log_level: default_log_level(),
        }
    }
}

/// The two secrets the bridge cannot run without.
#[derive(Clone)]
pub struct Credentials {
    pub chat_token: String,
    pub api_key: String,
}

/// Required settings that were not provided. Display lists one env var per line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required environment variables:{}", format_missing(.0))]
pub struct MissingConfig(pub Vec<&'static str>);

fn format_missing(vars: &[&'static str]) -> String {
    vars.iter().map(|v| format!("\n   - {}", v)).collect()
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in production; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENV_MATTERMOST_URL) {
            self.mattermost.url = v;
        }
        if let Some(v) = get(ENV_MATTERMOST_PORT) {
            self.mattermost.port = v
                .parse()
                .with_context(|| format!("parsing {}={}", ENV_MATTERMOST_PORT, v))?;
        }
        if let Some(v) = get(ENV_MATTERMOST_SCHEME) {
            self.mattermost.scheme = v;
        }
        if let Some(v) = get(ENV_MATTERMOST_TOKEN) {
            self.mattermost.token = Some(v);
        }
        if let Some(v) = get(ENV_BACKEND_URL) {
            self.backend.url = v;
        }
        if let Some(v) = get(ENV_BACKEND_API_KEY) {
            self.backend.api_key = Some(v);
        }
        if let Some(v) = get(ENV_BACKEND_TIMEOUT) {
            self.backend.timeout_secs = parse_secs(ENV_BACKEND_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_RECONNECT_DELAY) {
            self.reconnect.min_delay_secs = parse_secs(ENV_RECONNECT_DELAY, &v)?;
        }
        if let Some(v) = get(ENV_MAX_RECONNECT_DELAY) {
            self.reconnect.max_delay_secs = parse_secs(ENV_MAX_RECONNECT_DELAY, &v)?;
        }
        if let Some(v) = get(ENV_SHUTDOWN_GRACE) {
            self.shutdown_grace_secs = parse_secs(ENV_SHUTDOWN_GRACE, &v)?;
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            self.log_level = v.to_lowercase();
        }
        Ok(())
    }

    /// Check that both secrets are present (non-blank) and return them.
    pub fn validate(&self) -> Result<Credentials, MissingConfig> {
        let chat_token = secret(&self.mattermost.token);
        let api_key = secret(&self.backend.api_key);
        match (chat_token, api_key) {
            (Some(chat_token), Some(api_key)) => Ok(Credentials {
                chat_token,
                api_key,
            }),
            (chat_token, api_key) => {
                let mut missing = Vec::new();
                if chat_token.is_none() {
                    missing.push(ENV_MATTERMOST_TOKEN);
                }
                if api_key.is_none() {
                    missing.push(ENV_BACKEND_API_KEY);
                }
                Err(MissingConfig(missing))
            }
        }
    }

    /// Non-secret settings as log lines.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!(
                "mattermost: {}://{}:{}",
                self.mattermost.scheme, self.mattermost.url, self.mattermost.port
            ),
            format!(
                "backend: {} (timeout {}s)",
                self.backend.url, self.backend.timeout_secs
            ),
            format!(
                "reconnect: {}s..{}s",
                self.reconnect.min_delay_secs, self.reconnect.max_delay_secs
            ),
            format!("log level: {}", self.log_level),
        ]
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub fn min_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect.min_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect.max_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn secret(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("parsing {}={} as seconds", key, value))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".agent-bridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Read a config file. `Ok(None)` when the file does not exist.
pub fn read_config_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok(Some(config))
}

/// A loaded config and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// False when the file was missing and defaults were used.
    pub from_file: bool,
}

/// Load config from the given path (or the default). Missing file => default config.
/// Environment overrides are applied on top.
///
/// Nothing is logged here: logging is configured from the result.
pub fn load_config(path: Option<PathBuf>) -> Result<LoadedConfig> {
    let path = path.unwrap_or_else(default_config_path);
    let file = read_config_file(&path)?;
    let from_file = file.is_some();
    let mut config = file.unwrap_or_default();
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(LoadedConfig {
        config,
        path,
        from_file,
    })
}
