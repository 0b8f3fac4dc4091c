//! Sniffy Console - Live transaction feed for the Sniffy auditor
//!
//! Usage:
//!   sniffy-console serve              Open the operator console
//!   sniffy-console clear              Clear a proxy server's transactions
//!   sniffy-console toggle <OPTION>    Flip an operator option
//!   sniffy-console config             Show or update saved settings

mod api;
mod commands;
mod config;
mod emulate;
mod feed;
mod lifecycle;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feed::FeedOrder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sniffy-console")]
#[command(author = "Sniffy Team")]
#[command(version)]
#[command(about = "Live transaction feed for the Sniffy auditor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Auditor web interface URL (overrides the config file)
    #[arg(long, global = true, env = "SNIFFY_AUDITOR")]
    auditor: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the operator console
    Serve {
        /// Local port for the console
        #[arg(short, long)]
        port: Option<u16>,

        /// Open the console in the browser
        #[arg(long)]
        open: bool,

        /// Delay between polls in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Clear the transaction log of a proxy server
    Clear {
        /// Proxy server id
        #[arg(long)]
        ps: Option<String>,
    },

    /// Flip an operator option (logrequests, interceptssl, moderaterequests)
    Toggle {
        option: String,

        /// Proxy server id
        #[arg(long)]
        ps: Option<String>,
    },

    /// Show or update saved settings
    Config {
        /// Default proxy server id
        #[arg(long)]
        ps: Option<String>,

        /// Default console port
        #[arg(long)]
        port: Option<u16>,

        /// Default delay between polls in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Feed order (newest_first or oldest_first)
        #[arg(long)]
        order: Option<FeedOrder>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sniffy_console=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let mut config = config::Config::load().context("Failed to load console settings")?;

    // Saving settings persists the flag instead of applying it for one run
    if let Commands::Config {
        ps,
        port,
        interval_ms,
        order,
    } = cli.command
    {
        let update = commands::settings::SettingsUpdate {
            auditor_url: cli.auditor,
            proxy_server: ps,
            listen_port: port,
            poll_interval_ms: interval_ms,
            feed_order: order,
        };
        return commands::settings::run(config, update);
    }

    if let Some(auditor) = cli.auditor {
        config.auditor_url = auditor;
    }

    match cli.command {
        Commands::Serve {
            port,
            open,
            interval_ms,
        } => {
            let opts = commands::serve::ServeOptions {
                port,
                open,
                interval_ms,
            };
            commands::serve::run(config, opts).await?;
        }

        Commands::Clear { ps } => {
            commands::options::clear(&config, ps).await?;
        }

        Commands::Toggle { option, ps } => {
            commands::options::toggle(&config, &option, ps).await?;
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}
