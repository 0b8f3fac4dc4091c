//! Serve command: run the operator console in the browser

use crate::config::Config;
use crate::ui::port::find_console_port;
use crate::ui::{start_server, Console, Settings};
use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use std::time::Duration;

/// Serve options
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub port: Option<u16>,
    pub open: bool,
    pub interval_ms: Option<u64>,
}

/// Handle serve command
pub async fn run(config: Config, opts: ServeOptions) -> Result<()> {
    let preferred = opts.port.unwrap_or(config.listen_port);
    let mode = find_console_port(preferred).await?;
    let url = format!("http://127.0.0.1:{}/#!/auditor/interceptor", mode.port());

    if mode.is_running() {
        cliclack::log::info(format!(
            "Console already running at {}",
            style(&url).cyan().underlined()
        ))?;
        if opts.open {
            open_browser(&url)?;
        }
        return Ok(());
    }

    let mut settings = Settings::from(&config);
    if let Some(ms) = opts.interval_ms {
        settings.poll_interval = Duration::from_millis(ms.max(1));
    }

    let api = Arc::new(super::auditor_client(&config)?);
    let console = Console::new(api, settings.clone());
    let server = start_server(mode.port(), console.clone()).await?;

    cliclack::intro(style(" sniffy console ").on_cyan().black().to_string())?;
    cliclack::note(
        "Console",
        format!(
            "{}  {}\n{}  {}\n{}  {} ({:?})",
            style("URL").dim(),
            style(&url).cyan().underlined(),
            style("Auditor").dim(),
            config.auditor_url,
            style("Proxy server").dim(),
            settings.proxy_server,
            settings.poll_interval,
        ),
    )?;

    if opts.open {
        open_browser(&url)?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    console.shutdown().await;
    server.abort();
    cliclack::outro("Console stopped")?;
    Ok(())
}

fn open_browser(url: &str) -> Result<()> {
    if open::that(url).is_err() {
        cliclack::log::warning(format!("Could not open browser, visit {}", url))?;
    }
    Ok(())
}
