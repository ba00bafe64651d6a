//! Configuration system for glasslink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GLASSLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/glasslink/config.toml
//!   3. ~/.config/glasslink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Nordic UART TX characteristic used by both arms of the G1 glasses.
pub const DEFAULT_WRITE_TARGET: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlasslinkConfig {
    pub logging: LoggingConfig,
    pub links: LinksConfig,
    pub loopback: LoopbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset.
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Write target bound to the left arm at startup.
    pub left_target: String,
    /// Write target bound to the right arm at startup.
    pub right_target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Delay before each accepted write is acknowledged.
    pub ack_delay_ms: u64,
    /// Payloads longer than this are refused at write time.
    pub max_packet_len: usize,
    /// Status reported when an injected failure fires.
    pub fail_status: i32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            left_target: DEFAULT_WRITE_TARGET.into(),
            right_target: DEFAULT_WRITE_TARGET.into(),
        }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            ack_delay_ms: 5,
            max_packet_len: 251,
            fail_status: 133, // GATT_ERROR
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("glasslink")
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

impl GlasslinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, still applying env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            GlasslinkConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GLASSLINK_CONFIG")
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
            let text = toml::to_string_pretty(&GlasslinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply GLASSLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GLASSLINK_LOGGING__FILTER") {
            self.logging.filter = v;
        }
        if let Ok(v) = std::env::var("GLASSLINK_LOOPBACK__ACK_DELAY_MS") {
            if let Ok(ms) = v.parse() {
                self.loopback.ack_delay_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("GLASSLINK_LOOPBACK__MAX_PACKET_LEN") {
            if let Ok(len) = v.parse() {
                self.loopback.max_packet_len = len;
            }
        }
    }
}
