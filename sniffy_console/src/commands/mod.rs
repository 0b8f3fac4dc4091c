//! CLI commands

pub mod options;
pub mod serve;
pub mod settings;

use crate::api::AuditorClient;
use crate::config::Config;
use anyhow::{Context, Result};

/// Auditor client configured from the config file
fn auditor_client(config: &Config) -> Result<AuditorClient> {
    AuditorClient::new(
        &config.auditor_url,
        config.request_timeout(),
        config.accept_invalid_certs,
    )
    .context("Failed to create auditor client")
}
