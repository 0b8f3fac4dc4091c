//! Lazy, at-most-once expansion of feed rows into full transaction detail

use super::render;
use super::sanitize::Sanitize;
use super::{DetailState, FeedEvent, FeedView};
use crate::api::{ApiError, AuditorApi};
use sniffy_common::{constants, Headers, Response, Transaction};
use url::Url;

/// Errors expanding a row
#[derive(Debug, thiserror::Error)]
pub enum DetailError {
    #[error("No row for transaction {0}")]
    UnknownRow(i64),

    #[error("Transaction {0} is no longer known to the auditor")]
    NotFound(i64),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What an activation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    /// First activation: detail fetched, rendered and shown
    Fetched { html: String },
    /// Later activation: visibility flipped
    Toggled { visible: bool },
    /// A fetch for this row is already running
    Pending,
}

/// Response half of the detail view; a placeholder stands in when none was
/// recorded
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseView {
    pub id: String,
    pub time: Option<i64>,
    pub status: String,
    pub status_code: u16,
    pub proto: String,
    pub header: Headers,
    pub content_length: String,
    pub transfer_encoding: Option<Vec<String>>,
    pub closed: String,
}

impl ResponseView {
    pub fn placeholder() -> Self {
        Self {
            id: constants::NOT_AVAILABLE.to_string(),
            time: None,
            status: constants::NO_RESPONSE_STATUS.to_string(),
            status_code: 0,
            proto: constants::NOT_AVAILABLE.to_string(),
            header: Headers::new(),
            content_length: constants::NOT_AVAILABLE.to_string(),
            transfer_encoding: Some(vec![constants::NOT_AVAILABLE.to_string()]),
            closed: constants::NOT_AVAILABLE.to_string(),
        }
    }
}

impl From<Response> for ResponseView {
    fn from(response: Response) -> Self {
        Self {
            id: response.id.to_string(),
            time: Some(response.time),
            status: response.status,
            status_code: response.status_code,
            proto: response.proto,
            header: response.header,
            content_length: response.content_length.to_string(),
            transfer_encoding: response.transfer_encoding,
            closed: response.closed.to_string(),
        }
    }
}

/// Everything the detail row shows
#[derive(Debug, Clone, PartialEq)]
pub struct DetailView {
    /// Request half; `response` is always `None` here
    pub transaction: Transaction,
    /// Decoded query string of the request URL
    pub params: Headers,
    pub response: ResponseView,
}

impl DetailView {
    pub fn new(mut transaction: Transaction) -> Self {
        let response = transaction
            .response
            .take()
            .map(ResponseView::from)
            .unwrap_or_else(ResponseView::placeholder);
        let params = query_params(&transaction.request.url.normalized());

        Self {
            transaction,
            params,
            response,
        }
    }
}

/// Query parameters of an absolute or origin-relative URL
fn query_params(raw: &str) -> Headers {
    let parsed = Url::parse(raw)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(raw)));

    match parsed {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Headers::new(),
    }
}

async fn fetch_rendered(api: &dyn AuditorApi, id: i64) -> Result<String, DetailError> {
    let detail = api.fetch_detail(id).await?;
    let transaction = detail.transaction.ok_or(DetailError::NotFound(id))?;
    Ok(render::detail_row(&DetailView::new(transaction).sanitize()))
}

/// Expand a row on first activation, toggle it afterwards.
///
/// The feed lock is released while the detail is fetched. A failed fetch
/// puts the row back to `Absent` so a later activation can retry.
pub async fn activate(
    feed: &FeedView,
    api: &dyn AuditorApi,
    id: i64,
) -> Result<DetailOutcome, DetailError> {
    {
        let mut rows = feed.feed.write().await;
        let row = rows.get_mut(id).ok_or(DetailError::UnknownRow(id))?;

        match &mut row.detail {
            DetailState::Loading => return Ok(DetailOutcome::Pending),
            DetailState::Loaded { visible, .. } => {
                *visible = !*visible;
                let visible = *visible;
                feed.emit(FeedEvent::Detail {
                    generation: feed.generation,
                    id,
                    html: None,
                    visible,
                });
                return Ok(DetailOutcome::Toggled { visible });
            }
            DetailState::Absent => {}
        }
        row.detail = DetailState::Loading;
    }

    let result = fetch_rendered(api, id).await;

    let mut rows = feed.feed.write().await;
    // cleared while the fetch was running
    let row = rows.get_mut(id).ok_or(DetailError::UnknownRow(id))?;

    match result {
        Ok(html) => {
            row.detail = DetailState::Loaded {
                html: html.clone(),
                visible: true,
            };
            drop(rows);
            feed.emit(FeedEvent::Detail {
                generation: feed.generation,
                id,
                html: Some(html.clone()),
                visible: true,
            });
            Ok(DetailOutcome::Fetched { html })
        }
        Err(e) => {
            row.detail = DetailState::Absent;
            tracing::debug!("Detail fetch for transaction {} failed: {}", id, e);
            Err(e)
        }
    }
}

/// Activate every row in display order
pub async fn activate_all(feed: &FeedView, api: &dyn AuditorApi) -> Vec<(i64, DetailError)> {
    let ids = feed.ids().await;
    let results =
        futures_util::future::join_all(ids.iter().map(|&id| activate(feed, api, id))).await;

    ids.into_iter()
        .zip(results)
        .filter_map(|(id, result)| result.err().map(|e| (id, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{transaction, MemoryAuditor};
    use crate::feed::FeedOrder;
    use sniffy_common::RequestUrl;
    use tokio::sync::broadcast;

    async fn feed_with(ids: &[i64]) -> FeedView {
        let (tx, _) = broadcast::channel(64);
        let feed = FeedView::new(1, FeedOrder::NewestFirst, tx);
        feed.append_batch(ids.iter().map(|&id| transaction(id, id)).collect(), &[], false)
            .await;
        feed
    }

    #[test]
    fn test_placeholder_response() {
        let view = DetailView::new(transaction(1, 1));
        assert_eq!(view.response.status, "No response recorded");
        assert_eq!(view.response.status_code, 0);
        assert_eq!(view.response.id, "N/A");
        assert_eq!(view.response.proto, "N/A");
        assert_eq!(view.response.content_length, "N/A");
        assert_eq!(view.response.closed, "N/A");
        assert_eq!(view.response.transfer_encoding, Some(vec!["N/A".to_string()]));
    }

    #[test]
    fn test_query_params() {
        assert_eq!(
            query_params("http://example.com/a?x=1&y=two%20words"),
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "two words".to_string())
            ]
        );
        assert_eq!(query_params("/relative?k=v").len(), 1);
        assert!(query_params("http://example.com/").is_empty());
    }

    #[tokio::test]
    async fn test_activate_twice_fetches_once() {
        let api = MemoryAuditor::new();
        api.insert_detail(transaction(7, 7)).await;
        let feed = feed_with(&[7]).await;

        let first = activate(&feed, &api, 7).await.unwrap();
        assert!(matches!(first, DetailOutcome::Fetched { ref html } if html.contains("detail-7")));

        let second = activate(&feed, &api, 7).await.unwrap();
        assert_eq!(second, DetailOutcome::Toggled { visible: false });

        let third = activate(&feed, &api, 7).await.unwrap();
        assert_eq!(third, DetailOutcome::Toggled { visible: true });

        assert_eq!(*api.detail_calls.lock().await, vec![7]);
    }

    #[tokio::test]
    async fn test_loading_row_is_not_refetched() {
        let api = MemoryAuditor::new();
        let feed = feed_with(&[3]).await;
        feed.feed.write().await.get_mut(3).unwrap().detail = DetailState::Loading;

        assert_eq!(activate(&feed, &api, 3).await.unwrap(), DetailOutcome::Pending);
        assert!(api.detail_calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_detail_allows_retry() {
        let api = MemoryAuditor::new();
        let feed = feed_with(&[9]).await;

        assert!(matches!(
            activate(&feed, &api, 9).await,
            Err(DetailError::NotFound(9))
        ));
        assert_eq!(
            feed.feed.read().await.get(9).unwrap().detail,
            DetailState::Absent
        );

        api.insert_detail(transaction(9, 9)).await;
        assert!(matches!(
            activate(&feed, &api, 9).await,
            Ok(DetailOutcome::Fetched { .. })
        ));
        assert_eq!(api.detail_calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_resets() {
        let api = MemoryAuditor::new();
        *api.fail_actions.lock().await = true;
        let feed = feed_with(&[1]).await;

        assert!(matches!(
            activate(&feed, &api, 1).await,
            Err(DetailError::Api(_))
        ));
        assert_eq!(
            feed.feed.read().await.get(1).unwrap().detail,
            DetailState::Absent
        );
    }

    #[tokio::test]
    async fn test_unknown_row() {
        let api = MemoryAuditor::new();
        let feed = feed_with(&[]).await;
        assert!(matches!(
            activate(&feed, &api, 4).await,
            Err(DetailError::UnknownRow(4))
        ));
    }

    #[tokio::test]
    async fn test_detail_is_sanitized() {
        let api = MemoryAuditor::new();
        let mut hostile = transaction(2, 2);
        hostile.request.url = RequestUrl::from_raw("http://x/?q=<img onerror=alert(1)>");
        api.insert_detail(hostile).await;
        let feed = feed_with(&[2]).await;

        match activate(&feed, &api, 2).await.unwrap() {
            DetailOutcome::Fetched { html } => {
                assert!(!html.contains("<img"));
                assert!(html.contains("&lt;img onerror=alert(1)&gt;"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activate_all() {
        let api = MemoryAuditor::new();
        api.insert_detail(transaction(1, 1)).await;
        api.insert_detail(transaction(2, 2)).await;
        let feed = feed_with(&[1, 2, 3]).await;

        let failures = activate_all(&feed, &api).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 3);

        let rows = feed.snapshot().await;
        assert!(rows[1].detail_visible);
        assert!(rows[2].detail_visible);
        assert!(rows[0].detail.is_none());
    }
}
