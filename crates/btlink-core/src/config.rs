//! Configuration system for btlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BTLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/btlink/config.toml
//!   3. ~/.config/btlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BtlinkConfig {
    pub engine: EngineConfig,
    pub api: ApiConfig,
    pub profiles: ProfilesConfig,
    pub policy: PolicyConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on Connecting / Incoming before the attempt is cancelled.
    pub connect_timeout_ms: u64,
    /// Bound on Disconnecting before the machine is forced to Disconnected.
    pub disconnect_timeout_ms: u64,
    /// How long `stop()` waits for the worker before abandoning it.
    pub shutdown_join_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Local HTTP API port (bound on 127.0.0.1).
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Profiles hosted by the daemon, e.g. "battery", "csip".
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Where connection policies are persisted. Empty = memory only.
    pub persist_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay before the simulated controller answers a request.
    pub connect_latency_ms: u64,
    /// Peers (AA:BB:CC:DD:EE:FF) that never answer a connect request.
    pub unreachable: Vec<String>,
    /// Peers bonded at startup.
    pub bonded: Vec<String>,
    /// If true, every peer is reported as bonded.
    pub auto_bond: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            disconnect_timeout_ms: 5_000,
            shutdown_join_timeout_ms: 1_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9101 }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["battery".to_string(), "csip".to_string()],
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            persist_path: data_dir().join("policy.json"),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            connect_latency_ms: 200,
            unreachable: Vec::new(),
            bonded: Vec::new(),
            auto_bond: false,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("btlink")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("btlink")
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

impl BtlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BtlinkConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BTLINK_CONFIG")
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
            let text = toml::to_string_pretty(&BtlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BTLINK_* overrides. `lookup` is the environment in production.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("BTLINK_ENGINE__CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.engine.connect_timeout_ms = ms;
        }
        if let Some(ms) =
            lookup("BTLINK_ENGINE__DISCONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.engine.disconnect_timeout_ms = ms;
        }
        if let Some(port) = lookup("BTLINK_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = port;
        }
        if let Some(v) = lookup("BTLINK_SIMULATOR__AUTO_BOND") {
            self.simulator.auto_bond = v == "true" || v == "1";
        }
    }
}
