//! CLI configuration management

use crate::feed::FeedSettings;
use anyhow::{Context, Result};
use feedview_common::constants;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedview")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".feedview")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Get the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure all config directories exist
pub fn ensure_dirs() -> Result<()> {
    let config = config_dir();
    let logs = logs_dir();

    fs::create_dir_all(&config).context("Failed to create config directory")?;
    fs::create_dir_all(&logs).context("Failed to create logs directory")?;

    Ok(())
}

/// Main configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Capture backend URL (default: http://localhost:8898)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Cap on retained entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries per backfill page
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Backfill request timeout
    #[serde(default = "default_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Entries replayed when the live feed first opens
    #[serde(default = "default_page_limit")]
    pub initial_fetch_limit: u32,

    #[serde(default = "default_timeout_ms")]
    pub initial_fetch_timeout_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:8898".to_string()
}

fn default_max_entries() -> usize {
    constants::MAX_ENTRIES
}

fn default_page_limit() -> u32 {
    constants::BACKFILL_PAGE_LIMIT
}

fn default_timeout_ms() -> u64 {
    constants::BACKFILL_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            max_entries: default_max_entries(),
            page_limit: default_page_limit(),
            fetch_timeout_ms: default_timeout_ms(),
            initial_fetch_limit: default_page_limit(),
            initial_fetch_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = config_file();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_file();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get WebSocket URL from server URL
    pub fn websocket_url(&self) -> String {
        let ws_scheme = if self.server_url.starts_with("https://") {
            "wss"
        } else {
            "ws"
        };
        let host = self
            .server_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("{}://{}", ws_scheme, host)
    }

    /// Validated session settings
    pub fn feed_settings(&self) -> Result<FeedSettings> {
        let settings = FeedSettings::new(self.max_entries)
            .with_context(|| format!("Invalid max_entries {}", self.max_entries))?;

        let settings = FeedSettings {
            page_limit: self.page_limit,
            fetch_timeout_ms: self.fetch_timeout_ms,
            initial_fetch_limit: self.initial_fetch_limit,
            initial_fetch_timeout_ms: self.initial_fetch_timeout_ms,
            ..settings
        };
        settings
            .validate()
            .with_context(|| format!("Invalid fetch_timeout_ms {}", self.fetch_timeout_ms))?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_yaml("server_url: https://hub.example.com\nmax_entries: 500\n").unwrap();
        assert_eq!(config.server_url, "https://hub.example.com");
        assert_eq!(config.max_entries, 500);
        assert_eq!(config.page_limit, 100);
        assert_eq!(config.fetch_timeout_ms, 3000);
    }

    #[test]
    fn test_websocket_url() {
        let mut config = Config::default();
        assert_eq!(config.websocket_url(), "ws://localhost:8898");

        config.server_url = "https://hub.example.com/".to_string();
        assert_eq!(config.websocket_url(), "wss://hub.example.com/");
    }

    #[test]
    fn test_feed_settings_validation() {
        let mut config = Config::default();
        config.page_limit = 25;
        let settings = config.feed_settings().unwrap();
        assert_eq!(settings.max_entries, constants::MAX_ENTRIES);
        assert_eq!(settings.page_limit, 25);

        config.max_entries = 0;
        assert!(config.feed_settings().is_err());
    }

    #[test]
    fn test_zero_backfill_timeout_is_rejected() {
        let config = Config {
            fetch_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.feed_settings().is_err());

        let config = Config::from_yaml("fetch_timeout_ms: 0\n").unwrap();
        assert!(config.feed_settings().is_err());
    }
}
