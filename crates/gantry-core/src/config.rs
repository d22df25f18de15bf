//! Configuration system for Gantry.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GANTRY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/gantry/config.toml
//!   3. ~/.config/gantry/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::MAX_FRAME_BYTES;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub network: NetworkConfig,
    pub heartbeat: HeartbeatConfig,
    pub transport: TransportConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the packet service listens on.
    pub listen_addr: String,
    /// Port for the local HTTP status API. 0 = disabled.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Heartbeat interval in milliseconds. 0 = no heartbeats.
    pub interval_ms: u64,
    /// Per-frame read timeout in milliseconds. 0 = no deadline.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Depth of each connection's inbound and outbound queues.
    pub queue_capacity: usize,
    /// Largest accepted frame, in bytes after the size prefix.
    pub max_frame_bytes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Job names in delete requests arrive base64url-encoded.
    pub job_base64_encoded: bool,
    /// Reported in status responses.
    pub path_prefix: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9092".to_string(),
            api_port: 9093,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            timeout_ms: 45_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            job_base64_encoded: false,
            path_prefix: String::new(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("gantry")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GantryConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GantryConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GANTRY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GantryConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply GANTRY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GANTRY_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(p) = lookup("GANTRY_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(ms) = lookup("GANTRY_HEARTBEAT__INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.heartbeat.interval_ms = ms;
        }
        if let Some(ms) = lookup("GANTRY_HEARTBEAT__TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.heartbeat.timeout_ms = ms;
        }
        if let Some(v) = lookup("GANTRY_GATEWAY__JOB_BASE64") {
            self.gateway.job_base64_encoded = v == "true" || v == "1";
        }
    }
}
