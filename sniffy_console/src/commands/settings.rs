//! Config command: show or update the saved console settings

use crate::config::{config_file, Config};
use crate::feed::FeedOrder;
use anyhow::{Context, Result};
use console::style;

/// Values to persist; `None` keeps the saved value
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub auditor_url: Option<String>,
    pub proxy_server: Option<String>,
    pub listen_port: Option<u16>,
    pub poll_interval_ms: Option<u64>,
    pub feed_order: Option<FeedOrder>,
}

impl SettingsUpdate {
    fn is_empty(&self) -> bool {
        self.auditor_url.is_none()
            && self.proxy_server.is_none()
            && self.listen_port.is_none()
            && self.poll_interval_ms.is_none()
            && self.feed_order.is_none()
    }

    fn apply(self, config: &mut Config) {
        if let Some(v) = self.auditor_url {
            config.auditor_url = v;
        }
        if let Some(v) = self.proxy_server {
            config.proxy_server = v;
        }
        if let Some(v) = self.listen_port {
            config.listen_port = v;
        }
        if let Some(v) = self.poll_interval_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.feed_order {
            config.feed_order = v;
        }
    }
}

/// Handle config command
pub fn run(mut config: Config, update: SettingsUpdate) -> Result<()> {
    let path = config_file();

    if !update.is_empty() {
        update.apply(&mut config);
        config
            .save_to(&path)
            .context("Failed to save console settings")?;
        cliclack::log::success(format!("Saved {}", style(path.display()).cyan()))?;
    }

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
    cliclack::note(path.display().to_string(), yaml.trim_end())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unset_values() {
        let mut config = Config::default();
        let update = SettingsUpdate {
            proxy_server: Some("9".to_string()),
            feed_order: Some(FeedOrder::OldestFirst),
            ..SettingsUpdate::default()
        };
        assert!(!update.is_empty());

        update.apply(&mut config);
        assert_eq!(config.proxy_server, "9");
        assert_eq!(config.feed_order, FeedOrder::OldestFirst);
        assert_eq!(config.auditor_url, Config::default().auditor_url);
        assert!(SettingsUpdate::default().is_empty());
    }
}
