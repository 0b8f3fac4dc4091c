//! In-memory auditor for tests

use super::{ApiError, AuditorApi};
use async_trait::async_trait;
use reqwest::StatusCode;
use sniffy_common::{
    EmulationPayload, OperatorOption, Transaction, TransactionBatch, TransactionDetail,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Scripted reply to a summary fetch
pub enum Reply {
    Batch(TransactionBatch),
    Fail,
}

/// Auditor double that replays scripted batches and records every call
#[derive(Default)]
pub struct MemoryAuditor {
    replies: Mutex<VecDeque<Reply>>,
    details: Mutex<HashMap<i64, Transaction>>,
    fetch_delay: Mutex<Option<Duration>>,
    pub fetch_calls: Mutex<Vec<(String, i64)>>,
    pub detail_calls: Mutex<Vec<i64>>,
    pub submitted: Mutex<Vec<(String, EmulationPayload)>>,
    pub cleared: Mutex<Vec<String>>,
    pub toggled: Mutex<Vec<(String, OperatorOption)>>,
    pub fail_actions: Mutex<bool>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_batch(&self, since: i64, transactions: Vec<Transaction>, queued: Vec<i64>) {
        self.replies.lock().await.push_back(Reply::Batch(TransactionBatch {
            since,
            transactions,
            queued_ids: queued,
        }));
    }

    pub async fn push_failure(&self) {
        self.replies.lock().await.push_back(Reply::Fail);
    }

    pub async fn insert_detail(&self, transaction: Transaction) {
        self.details.lock().await.insert(transaction.id, transaction);
    }

    /// Make every summary fetch take this long
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().await = Some(delay);
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetch_calls.lock().await.len()
    }

    pub async fn sinces(&self) -> Vec<i64> {
        self.fetch_calls.lock().await.iter().map(|(_, s)| *s).collect()
    }

    fn unavailable() -> ApiError {
        ApiError::Status(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Transaction fixture with a recognisable URL
pub fn transaction(id: i64, time: i64) -> Transaction {
    let mut tx = Transaction {
        id,
        time,
        ..Transaction::default()
    };
    tx.request.method = "GET".to_string();
    tx.request.url = sniffy_common::RequestUrl::from_raw(format!("http://example.com/{}", id));
    tx.request.proto = "HTTP/1.1".to_string();
    tx.request.host = "example.com".to_string();
    tx.request.remote_addr = "10.0.0.1:4000".to_string();
    tx
}

#[async_trait]
impl AuditorApi for MemoryAuditor {
    async fn fetch_since(
        &self,
        proxy_server: &str,
        since: i64,
    ) -> Result<TransactionBatch, ApiError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetch_calls
            .lock()
            .await
            .push((proxy_server.to_string(), since));

        let delay = *self.fetch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().await.pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Batch(batch)) => Ok(batch),
            Some(Reply::Fail) => Err(Self::unavailable()),
            // Nothing new: the auditor echoes the cursor back
            None => Ok(TransactionBatch {
                since,
                ..TransactionBatch::default()
            }),
        }
    }

    async fn fetch_detail(&self, id: i64) -> Result<TransactionDetail, ApiError> {
        self.detail_calls.lock().await.push(id);
        if *self.fail_actions.lock().await {
            return Err(Self::unavailable());
        }
        Ok(TransactionDetail {
            transaction: self.details.lock().await.get(&id).cloned(),
        })
    }

    async fn submit(
        &self,
        proxy_server: &str,
        payload: &EmulationPayload,
    ) -> Result<String, ApiError> {
        if *self.fail_actions.lock().await {
            return Err(Self::unavailable());
        }
        self.submitted
            .lock()
            .await
            .push((proxy_server.to_string(), payload.clone()));
        Ok("<h1>replayed</h1>".to_string())
    }

    async fn clear(&self, proxy_server: &str) -> Result<(), ApiError> {
        if *self.fail_actions.lock().await {
            return Err(Self::unavailable());
        }
        self.cleared.lock().await.push(proxy_server.to_string());
        Ok(())
    }

    async fn set_option(
        &self,
        proxy_server: &str,
        option: OperatorOption,
    ) -> Result<(), ApiError> {
        if *self.fail_actions.lock().await {
            return Err(Self::unavailable());
        }
        self.toggled
            .lock()
            .await
            .push((proxy_server.to_string(), option));
        Ok(())
    }
}
