//! Config command: show or update the saved configuration

use crate::config::{config_file, Config};
use anyhow::Result;
use console::style;

/// Requested configuration changes
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub server_url: Option<String>,
    pub max_entries: Option<usize>,
    pub page_limit: Option<u32>,
    pub fetch_timeout_ms: Option<u64>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.server_url.is_none()
            && self.max_entries.is_none()
            && self.page_limit.is_none()
            && self.fetch_timeout_ms.is_none()
    }

    /// Apply the changes, rejecting values the session would refuse
    pub fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(url) = self.server_url {
            config.server_url = url.trim_end_matches('/').to_string();
        }
        if let Some(max) = self.max_entries {
            config.max_entries = max;
        }
        if let Some(limit) = self.page_limit {
            config.page_limit = limit;
        }
        if let Some(timeout) = self.fetch_timeout_ms {
            config.fetch_timeout_ms = timeout;
        }

        config.feed_settings()?;
        Ok(())
    }
}

/// Run the config command
pub async fn run(update: ConfigUpdate) -> Result<()> {
    let mut config = Config::load()?;

    if !update.is_empty() {
        update.apply(&mut config)?;
        config.save()?;
        println!("{} {}", style("Saved").green(), style(config_file().display()).dim());
        println!();
    }

    print_config(&config);
    Ok(())
}

fn print_config(config: &Config) {
    let rows = [
        ("server_url", config.server_url.clone()),
        ("max_entries", config.max_entries.to_string()),
        ("page_limit", config.page_limit.to_string()),
        ("fetch_timeout_ms", config.fetch_timeout_ms.to_string()),
        ("initial_fetch_limit", config.initial_fetch_limit.to_string()),
        ("initial_fetch_timeout_ms", config.initial_fetch_timeout_ms.to_string()),
    ];

    for (name, value) in rows {
        println!("{:<26} {}", style(name).dim(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_update() {
        let mut config = Config::default();
        let update = ConfigUpdate {
            server_url: Some("https://hub.example.com/".to_string()),
            page_limit: Some(50),
            ..Default::default()
        };
        assert!(!update.is_empty());

        update.apply(&mut config).unwrap();
        assert_eq!(config.server_url, "https://hub.example.com");
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.max_entries, 10_000);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = Config::default();
        let update = ConfigUpdate {
            max_entries: Some(0),
            ..Default::default()
        };
        assert!(update.apply(&mut config).is_err());
        assert!(ConfigUpdate::default().is_empty());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        let update = ConfigUpdate {
            fetch_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(update.apply(&mut config).is_err());
    }
}
