//! Pledger configuration system.
//!
//! Everything the scheduler needs is passed in explicitly at construction —
//! there are no process-wide singletons or hardcoded service keys. This file
//! only defines the TOML format and its defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PledgerError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PledgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for PledgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl PledgerConfig {
    /// Load config from the default path (~/.pledger/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PledgerError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PledgerError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PledgerError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Pledger home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pledger")
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file (recipients, commitments,
    /// delivery log). Tilde-expanded by the binary.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.pledger/pledger.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrent deliveries within one tick
    /// (respects transport rate limits).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sends: usize,
    /// Fallback zone for the missed-commitment sweep when an
    /// organization has no zone configured.
    #[serde(default = "default_zone")]
    pub default_time_zone: String,
}

fn default_max_concurrent() -> usize {
    8
}
fn default_zone() -> String {
    "UTC".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: default_max_concurrent(),
            default_time_zone: default_zone(),
        }
    }
}

/// Delivery transport selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// "log" (no external sends, for dev), "email", or "webhook".
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_mode() -> String {
    "log".into()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            email: EmailConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// SMTP sending configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Pledger".into()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
        }
    }
}

/// Generic HTTP webhook transport configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PledgerConfig::default();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.scheduler.max_concurrent_sends, 8);
        assert_eq!(config.scheduler.default_time_zone, "UTC");
        assert_eq!(config.transport.mode, "log");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: PledgerConfig = toml::from_str(
            r#"
            [scheduler]
            max_concurrent_sends = 2

            [transport]
            mode = "email"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.max_concurrent_sends, 2);
        assert_eq!(config.transport.mode, "email");
        // untouched sections fall back to defaults
        assert_eq!(config.storage.db_path, "~/.pledger/pledger.db");
    }
}
