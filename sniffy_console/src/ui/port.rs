//! Port selection for the local console

use super::SERVICE_NAME;
use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpListener;

/// Maximum number of ports to try before giving up
const MAX_PORT_ATTEMPTS: u16 = 10;

/// What to do on the chosen port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Bind a new console here
    Start(u16),
    /// A console is already serving here; just open it
    Running(u16),
}

impl ConsoleMode {
    pub fn port(&self) -> u16 {
        match self {
            ConsoleMode::Start(p) | ConsoleMode::Running(p) => *p,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ConsoleMode::Running(_))
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    service: String,
}

enum PortCheck {
    Free,
    Console,
    Taken,
}

async fn check_port(client: &Client, port: u16) -> PortCheck {
    let health_url = format!("http://127.0.0.1:{}/api/health", port);

    match client.get(&health_url).send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<HealthResponse>().await {
                Ok(health) if health.service == SERVICE_NAME => PortCheck::Console,
                _ => PortCheck::Taken,
            }
        }
        Ok(_) => PortCheck::Taken,
        // refused connection: nothing listening
        Err(e) if e.is_connect() => PortCheck::Free,
        Err(_) => PortCheck::Taken,
    }
}

async fn can_bind(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}

/// Find a port for the console, starting at `preferred`.
///
/// A port already serving a console is reused; a port held by anything else
/// is skipped.
pub async fn find_console_port(preferred: u16) -> Result<ConsoleMode> {
    let client = Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let Some(port) = preferred.checked_add(offset) else {
            break;
        };

        match check_port(&client, port).await {
            PortCheck::Console => {
                tracing::debug!("Found running console on port {}", port);
                return Ok(ConsoleMode::Running(port));
            }
            PortCheck::Free if can_bind(port).await => {
                tracing::debug!("Port {} is available for the console", port);
                return Ok(ConsoleMode::Start(port));
            }
            PortCheck::Free => {
                tracing::debug!("Port {} appeared free but could not be bound", port);
            }
            PortCheck::Taken => {
                tracing::debug!("Port {} is used by another service", port);
            }
        }
    }

    anyhow::bail!(
        "Could not find a port for the console (tried {} ports starting from {})",
        MAX_PORT_ATTEMPTS,
        preferred
    )
}
