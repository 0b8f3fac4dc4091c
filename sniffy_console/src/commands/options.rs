//! One-shot operator actions against the auditor

use crate::api::AuditorApi;
use crate::config::Config;
use anyhow::{Context, Result};
use console::style;
use sniffy_common::OperatorOption;

/// Wipe the transaction log of a proxy server
pub async fn clear(config: &Config, proxy_server: Option<String>) -> Result<()> {
    let proxy_server = proxy_server.unwrap_or_else(|| config.proxy_server.clone());
    let api = super::auditor_client(config)?;

    let spinner = cliclack::spinner();
    spinner.start(format!("Clearing proxy server {}...", proxy_server));

    match api.clear(&proxy_server).await {
        Ok(()) => {
            spinner.stop(format!(
                "Cleared transactions of proxy server {}",
                style(&proxy_server).green()
            ));
            Ok(())
        }
        Err(e) => {
            spinner.error("Clear failed");
            Err(e).context(format!("Auditor at {} refused to clear", api.base_url()))
        }
    }
}

/// Flip a named option on a proxy server
pub async fn toggle(config: &Config, option: &str, proxy_server: Option<String>) -> Result<()> {
    let option: OperatorOption = option.parse()?;
    let proxy_server = proxy_server.unwrap_or_else(|| config.proxy_server.clone());
    let api = super::auditor_client(config)?;

    api.set_option(&proxy_server, option)
        .await
        .with_context(|| format!("Failed to toggle {}", option.label()))?;

    cliclack::log::success(format!(
        "Toggled {} on proxy server {}",
        style(option.label()).cyan(),
        style(&proxy_server).green()
    ))?;
    Ok(())
}
