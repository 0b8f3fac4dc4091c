//! Live transaction feed
//!
//! A [`FeedView`] is created for every navigation to the interceptor page.
//! The poller appends rows to it, the detail fetcher expands them, and every
//! change is broadcast to connected browsers as a [`FeedEvent`].

pub mod detail;
pub mod poll;
pub mod render;
pub mod sanitize;

use poll::PollHandle;
use render::{RowFlags, SummaryView};
use sanitize::Sanitize;
use serde::{Deserialize, Serialize};
use sniffy_common::Transaction;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Display order of the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrder {
    /// New rows go right after the anchor row
    #[default]
    NewestFirst,
    OldestFirst,
}

impl std::str::FromStr for FeedOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "newest_first" | "newest" => Ok(FeedOrder::NewestFirst),
            "oldest_first" | "oldest" => Ok(FeedOrder::OldestFirst),
            other => Err(format!("unknown feed order: {}", other)),
        }
    }
}

impl FeedOrder {
    pub fn placement(&self) -> Placement {
        match self {
            FeedOrder::NewestFirst => Placement::AfterAnchor,
            FeedOrder::OldestFirst => Placement::Append,
        }
    }
}

/// Where the browser inserts each row of a `Rows` event, one after another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    AfterAnchor,
    Append,
}

/// Expansion state of a row
#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
    Absent,
    Loading,
    Loaded { html: String, visible: bool },
}

/// One transaction in the feed
#[derive(Debug, Clone)]
pub struct FeedRow {
    pub id: i64,
    /// Summary as received, used to prefill the emulation form
    pub transaction: Transaction,
    pub html: String,
    pub queued: bool,
    pub fresh: bool,
    pub detail: DetailState,
}

/// Rows in arrival order with an id index
#[derive(Debug, Default)]
pub struct Feed {
    rows: Vec<FeedRow>,
    index: HashMap<i64, usize>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row; returns false when the id is already present
    pub fn push(&mut self, row: FeedRow) -> bool {
        if self.index.contains_key(&row.id) {
            return false;
        }
        self.index.insert(row.id, self.rows.len());
        self.rows.push(row);
        true
    }

    pub fn get(&self, id: i64) -> Option<&FeedRow> {
        self.index.get(&id).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut FeedRow> {
        self.index.get(&id).map(|&i| &mut self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    /// Rows as the operator sees them
    pub fn ordered(&self, order: FeedOrder) -> Vec<&FeedRow> {
        match order {
            FeedOrder::NewestFirst => self.rows.iter().rev().collect(),
            FeedOrder::OldestFirst => self.rows.iter().collect(),
        }
    }
}

/// Rendered row as sent to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFragment {
    pub id: i64,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub detail_visible: bool,
}

/// Event pushed to connected browsers
///
/// `generation` identifies the navigation the event belongs to so a browser
/// can drop events from a page it already left.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    Page {
        generation: u64,
        page: Option<String>,
        proxy_server: String,
    },
    Rows {
        generation: u64,
        placement: Placement,
        rows: Vec<RowFragment>,
    },
    Detail {
        generation: u64,
        id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        visible: bool,
    },
    Clear {
        generation: u64,
    },
    State {
        generation: u64,
        paused: bool,
    },
}

/// Feed state of one interceptor page visit
pub struct FeedView {
    generation: u64,
    order: FeedOrder,
    feed: RwLock<Feed>,
    events: broadcast::Sender<FeedEvent>,
    closed: AtomicBool,
    poller: std::sync::Mutex<Option<PollHandle>>,
}

impl FeedView {
    pub fn new(generation: u64, order: FeedOrder, events: broadcast::Sender<FeedEvent>) -> Self {
        Self {
            generation,
            order,
            feed: RwLock::new(Feed::new()),
            events,
            closed: AtomicBool::new(false),
            poller: std::sync::Mutex::new(None),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn order(&self) -> FeedOrder {
        self.order
    }

    /// Broadcast an event; having no browser connected is fine
    pub fn emit(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }

    /// Mark the view as torn down; late results are dropped from here on
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The running poller, if any
    pub fn poller(&self) -> Option<PollHandle> {
        self.poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Sanitize, render and append a batch in boundary order.
    ///
    /// `fresh` marks rows that arrived after the initial load. Returns the
    /// number of rows added.
    pub async fn append_batch(
        &self,
        transactions: Vec<Transaction>,
        queued_ids: &[i64],
        fresh: bool,
    ) -> usize {
        if self.is_closed() {
            return 0;
        }

        let queued: HashSet<i64> = queued_ids.iter().copied().collect();
        let mut fragments = Vec::with_capacity(transactions.len());

        let mut feed = self.feed.write().await;
        for transaction in transactions {
            let flags = RowFlags {
                queued: queued.contains(&transaction.id),
                fresh,
            };
            let html = render::summary_row(&SummaryView::new(&transaction).sanitize(), flags);
            let row = FeedRow {
                id: transaction.id,
                transaction,
                html,
                queued: flags.queued,
                fresh,
                detail: DetailState::Absent,
            };

            let fragment = RowFragment {
                id: row.id,
                html: row.html.clone(),
                detail: None,
                detail_visible: false,
            };
            if feed.push(row) {
                fragments.push(fragment);
            } else {
                tracing::debug!("Skipping duplicate transaction {}", fragment.id);
            }
        }
        drop(feed);

        let added = fragments.len();
        if added > 0 {
            self.emit(FeedEvent::Rows {
                generation: self.generation,
                placement: self.order.placement(),
                rows: fragments,
            });
        }
        added
    }

    /// Current rows in display order, with loaded details
    pub async fn snapshot(&self) -> Vec<RowFragment> {
        let feed = self.feed.read().await;
        feed.ordered(self.order)
            .into_iter()
            .map(|row| {
                let (detail, detail_visible) = match &row.detail {
                    DetailState::Loaded { html, visible } => (Some(html.clone()), *visible),
                    _ => (None, false),
                };
                RowFragment {
                    id: row.id,
                    html: row.html.clone(),
                    detail,
                    detail_visible,
                }
            })
            .collect()
    }

    /// Row ids in display order
    pub async fn ids(&self) -> Vec<i64> {
        let feed = self.feed.read().await;
        feed.ordered(self.order).into_iter().map(|row| row.id).collect()
    }

    pub async fn len(&self) -> usize {
        self.feed.read().await.len()
    }

    /// Summary transaction behind a row
    pub async fn transaction(&self, id: i64) -> Option<Transaction> {
        self.feed.read().await.get(id).map(|row| row.transaction.clone())
    }

    /// Drop every row and tell browsers to do the same
    pub async fn clear(&self) {
        self.feed.write().await.clear();
        self.emit(FeedEvent::Clear {
            generation: self.generation,
        });
    }
}
