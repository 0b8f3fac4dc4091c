//! HTTP client for the auditor JSON API

use super::{ApiError, AuditorApi};
use async_trait::async_trait;
use reqwest::Client;
use sniffy_common::{
    constants, EmulationPayload, OperatorOption, TransactionBatch, TransactionDetail,
};
use std::time::Duration;

/// Client for the auditor web interface
#[derive(Clone)]
pub struct AuditorClient {
    base_url: String,
    client: Client,
}

impl AuditorClient {
    /// Create a new client. Every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the auditor base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read the body of a response, failing on non-2xx statuses
    async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl AuditorApi for AuditorClient {
    async fn fetch_since(
        &self,
        proxy_server: &str,
        since: i64,
    ) -> Result<TransactionBatch, ApiError> {
        let since = since.to_string();
        let response = self
            .client
            .get(self.url(constants::GET_REQUESTS_PATH))
            .query(&[
                ("ps", proxy_server),
                ("since", since.as_str()),
                ("type", "summary"),
            ])
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        Ok(TransactionBatch::from_json(&body)?)
    }

    async fn fetch_detail(&self, id: i64) -> Result<TransactionDetail, ApiError> {
        let id = id.to_string();
        let response = self
            .client
            .get(self.url(constants::GET_REQUEST_PATH))
            .query(&[("id", id.as_str()), ("type", "full")])
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        Ok(TransactionDetail::from_json(&body)?)
    }

    async fn submit(
        &self,
        proxy_server: &str,
        payload: &EmulationPayload,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(constants::MAKE_REQUEST_PATH))
            .query(&[("ps", proxy_server)])
            .form(payload.fields())
            .send()
            .await?;

        Self::read_body(response).await
    }

    async fn clear(&self, proxy_server: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.url(constants::DELETE_REQUESTS_PATH))
            .query(&[("ps", proxy_server)])
            .send()
            .await?;

        Self::read_body(response).await?;
        tracing::debug!("Cleared transaction log of proxy server {}", proxy_server);
        Ok(())
    }

    async fn set_option(
        &self,
        proxy_server: &str,
        option: OperatorOption,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.url(constants::TOGGLE_PATH))
            .query(&[("option", option.as_str()), ("ps", proxy_server)])
            .send()
            .await?;

        Self::read_body(response).await?;
        tracing::debug!("Toggled {} on proxy server {}", option, proxy_server);
        Ok(())
    }
}
