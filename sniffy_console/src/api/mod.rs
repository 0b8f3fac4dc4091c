//! Boundary to the auditor JSON API
//!
//! Everything the console knows about captured traffic comes through the
//! [`AuditorApi`] trait. The HTTP implementation lives in [`client`]; tests use
//! an in-memory double.

mod client;
#[cfg(test)]
pub mod memory;

pub use client::AuditorClient;

use async_trait::async_trait;
use sniffy_common::{
    EmulationPayload, OperatorOption, ProtocolError, TransactionBatch, TransactionDetail,
};

/// Errors talking to the auditor
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Auditor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Auditor returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Malformed auditor response: {0}")]
    Malformed(#[from] ProtocolError),
}

#[async_trait]
pub trait AuditorApi: Send + Sync {
    /// Transaction summaries captured after `since`, oldest first
    async fn fetch_since(&self, proxy_server: &str, since: i64)
        -> Result<TransactionBatch, ApiError>;

    /// Full transaction, including its response when one was recorded
    async fn fetch_detail(&self, id: i64) -> Result<TransactionDetail, ApiError>;

    /// Replay a request through the proxy server; returns the raw response body
    async fn submit(
        &self,
        proxy_server: &str,
        payload: &EmulationPayload,
    ) -> Result<String, ApiError>;

    /// Wipe the transaction log of a proxy server
    async fn clear(&self, proxy_server: &str) -> Result<(), ApiError>;

    /// Flip a named boolean setting of a proxy server
    async fn set_option(&self, proxy_server: &str, option: OperatorOption)
        -> Result<(), ApiError>;
}
