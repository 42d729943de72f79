//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `TUNNELGATE_API_KEY`, `TUNNELGATE_LISTEN`
//! 2. **Config file**: path via `--config <path>`, or `tunnelgate.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [auth]
//! api_key = "your-secret-key"
//! protect_control = false
//!
//! [sessions]
//! timeout_minutes = 60
//! sweep_interval_secs = 60
//!
//! [audit]
//! max_entries = 500
//! webhook_url = "http://control-service:3001/log/tunnel-log"
//! webhook_timeout_secs = 5
//!
//! [logging]
//! level = "info"
//!
//! [[protocols]]
//! name = "spice"
//! parameters = ["hostname", "port", "password"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::protocols::ProtocolInfo;

const DEFAULT_CONFIG_FILE: &str = "tunnelgate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Extra or replacement protocol descriptors.
    #[serde(default)]
    pub protocols: Vec<ProtocolInfo>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared Bearer key for session issuing and the audit log.
    /// Override with `TUNNELGATE_API_KEY`. Defaults to `"change-me"`, which
    /// triggers a startup warning.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Also require the key on `/tunnel-control/*` (default false).
    #[serde(default)]
    pub protect_control: bool,
}

/// Session lifetime settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Minutes of inactivity after which a session without tunnels is
    /// evicted (default 60, 0 disables expiry).
    #[serde(default = "default_session_timeout_minutes")]
    pub timeout_minutes: u64,
    /// Seconds between expiry sweeps (default 60).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// File-transfer audit settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Transfer events kept in memory (default 500, 0 keeps none).
    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,
    /// When set, every transfer event is also POSTed here as JSON.
    pub webhook_url: Option<String>,
    /// Per-request timeout for the webhook (default 5).
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_api_key() -> String {
    "change-me".to_string()
}
fn default_session_timeout_minutes() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_audit_max_entries() -> usize {
    500
}
fn default_webhook_timeout_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            protect_control: false,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_session_timeout_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: default_audit_max_entries(),
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SessionsConfig {
    /// Idle timeout, or `None` when expiry is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_minutes > 0).then(|| Duration::from_secs(self.timeout_minutes * 60))
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `tunnelgate.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };

        if let Ok(key) = std::env::var("TUNNELGATE_API_KEY") {
            config.auth.api_key = key;
        }
        if let Ok(listen) = std::env::var("TUNNELGATE_LISTEN") {
            config.server.listen = listen;
        }

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
