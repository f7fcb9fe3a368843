//! Changeflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ChangeflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeflowConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for ChangeflowConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ChangeflowConfig {
    /// Load config from the default path (~/.changeflow/config.toml).
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
            .map_err(|e| ChangeflowError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ChangeflowError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChangeflowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Changeflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".changeflow")
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

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Scheduling engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Directory holding the pending-task snapshot file.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Endpoint hit when a change fires.
    #[serde(default = "default_target_endpoint")]
    pub target_endpoint: String,
    /// Endpoint answering `?change_number=` status queries.
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,
    /// Seconds between full status sweeps.
    #[serde(default = "default_status_check_interval")]
    pub status_check_interval_secs: u64,
    /// Timeout for the execution request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout for a single status query.
    #[serde(default = "default_status_timeout")]
    pub status_check_timeout_secs: u64,
}

fn default_data_dir() -> String { "~/.changeflow/data".into() }
fn default_target_endpoint() -> String { "https://yahoo.com".into() }
fn default_status_endpoint() -> String { "http://localhost:3001/change_status".into() }
fn default_status_check_interval() -> u64 { 60 }
fn default_request_timeout() -> u64 { 30 }
fn default_status_timeout() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            target_endpoint: default_target_endpoint(),
            status_endpoint: default_status_endpoint(),
            status_check_interval_secs: default_status_check_interval(),
            request_timeout_secs: default_request_timeout(),
            status_check_timeout_secs: default_status_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChangeflowConfig::default();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.scheduler.status_check_interval_secs, 60);
        assert_eq!(config.scheduler.status_check_timeout_secs, 10);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ChangeflowConfig = toml::from_str(
            r#"
            [scheduler]
            status_check_interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.status_check_interval_secs, 5);
        assert_eq!(config.scheduler.request_timeout_secs, 30);
        assert_eq!(config.gateway.host, "0.0.0.0");
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ChangeflowConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(err.is_err());
    }
}
