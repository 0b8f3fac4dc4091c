//! Local operator console
//!
//! Serves the browser UI, runs the page lifecycle and forwards feed events
//! over a WebSocket.

mod html;
pub mod port;
mod server;
pub(crate) mod state;

pub use server::start_server;
pub use state::{Console, Settings};

/// Service name reported by `/api/health`
pub const SERVICE_NAME: &str = "sniffy-console";
