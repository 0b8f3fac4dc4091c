//! Console state shared by every HTTP handler

use crate::api::{ApiError, AuditorApi};
use crate::config::Config;
use crate::emulate::{self, EmulationError, EmulationForm, EmulationOutcome};
use crate::feed::detail::{self, DetailError, DetailOutcome};
use crate::feed::poll::{PollHandle, PollState, PollSynchronizer};
use crate::feed::{FeedEvent, FeedOrder, FeedView};
use crate::lifecycle::{LifecycleManager, PageId};
use sniffy_common::{constants, OperatorOption, ProtocolError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Capacity of the browser event channel
const EVENT_CAPACITY: usize = 1024;

/// Errors surfaced to the browser
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("The interceptor page is not open")]
    NoFeed,

    #[error("No transaction {0} in the feed")]
    UnknownTransaction(i64),

    #[error(transparent)]
    Detail(#[from] DetailError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Emulation(#[from] EmulationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// State assumed for a proxy server the console has not toggled yet
fn default_option(option: OperatorOption) -> bool {
    matches!(option, OperatorOption::LogRequests)
}

/// Runtime settings taken from the config file and CLI flags
#[derive(Debug, Clone)]
pub struct Settings {
    pub proxy_server: String,
    pub poll_interval: Duration,
    pub feed_order: FeedOrder,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            proxy_server: config.proxy_server.clone(),
            poll_interval: config.poll_interval(),
            feed_order: config.feed_order,
        }
    }
}

/// What the browser needs to draw a page after navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub generation: u64,
    pub page: Option<PageId>,
    pub proxy_server: String,
    pub paused: bool,
}

pub struct Console {
    api: Arc<dyn AuditorApi>,
    lifecycle: Mutex<LifecycleManager>,
    /// Option state per proxy server, as last acknowledged by the auditor
    options: RwLock<HashMap<String, HashMap<OperatorOption, bool>>>,
    events: broadcast::Sender<FeedEvent>,
    default_proxy_server: String,
}

impl Console {
    pub fn new(api: Arc<dyn AuditorApi>, settings: Settings) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let default_proxy_server = settings.proxy_server.clone();
        let mut lifecycle = LifecycleManager::new(settings.proxy_server.clone());

        let page_events = events.clone();
        lifecycle.add_universal(move |ctx| {
            let _ = page_events.send(FeedEvent::Page {
                generation: ctx.generation,
                page: ctx.page.map(|p| p.as_str().to_string()),
                proxy_server: ctx.proxy_server.clone(),
            });
        });

        let feed_api = api.clone();
        let feed_events = events.clone();
        lifecycle.add_constructor(PageId::Interceptor, move |ctx| {
            let feed = Arc::new(FeedView::new(
                ctx.generation,
                settings.feed_order,
                feed_events.clone(),
            ));
            let poller = PollSynchronizer::start(
                feed_api.clone(),
                feed.clone(),
                ctx.proxy_server.clone(),
                constants::INITIAL_SINCE,
                settings.poll_interval,
            );

            let (closing_feed, closing_poller) = (feed.clone(), poller.clone());
            ctx.on_teardown(move || {
                closing_poller.stop();
                closing_feed.close();
            });

            ctx.feed = Some(feed);
            ctx.poller = Some(poller);
        });

        Arc::new(Self {
            api,
            lifecycle: Mutex::new(lifecycle),
            options: RwLock::new(HashMap::new()),
            events,
            default_proxy_server,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Tear down the current page and build the one `hash` points at
    pub async fn navigate(&self, hash: &str) -> PageSummary {
        let mut lifecycle = self.lifecycle.lock().await;
        let ctx = lifecycle.navigate(hash);
        tracing::info!(
            "Navigated to {} (proxy server {})",
            ctx.page.map(|p| p.as_str()).unwrap_or("unknown page"),
            ctx.proxy_server
        );

        PageSummary {
            generation: ctx.generation,
            page: ctx.page,
            proxy_server: ctx.proxy_server.clone(),
            paused: false,
        }
    }

    /// The page currently shown, if any
    pub async fn current_page(&self) -> Option<PageSummary> {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle.current().map(|ctx| PageSummary {
            generation: ctx.generation,
            page: ctx.page,
            proxy_server: ctx.proxy_server.clone(),
            paused: ctx
                .poller
                .as_ref()
                .is_some_and(|p| p.state() == PollState::Paused),
        })
    }

    /// Proxy server selected by the current page
    pub async fn proxy_server(&self) -> String {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle
            .current()
            .map(|ctx| ctx.proxy_server.clone())
            .unwrap_or_else(|| self.default_proxy_server.clone())
    }

    pub async fn feed(&self) -> Result<Arc<FeedView>, ConsoleError> {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle
            .current()
            .and_then(|ctx| ctx.feed.clone())
            .ok_or(ConsoleError::NoFeed)
    }

    async fn poller(&self) -> Result<PollHandle, ConsoleError> {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle
            .current()
            .and_then(|ctx| ctx.poller.clone())
            .ok_or(ConsoleError::NoFeed)
    }

    /// Pause or resume the feed; returns true when now paused
    pub async fn toggle_pause(&self) -> Result<bool, ConsoleError> {
        let poller = self.poller().await?;
        let feed = self.feed().await?;

        let next = match poller.state() {
            PollState::Running => poller.pause(),
            _ => poller.resume(),
        };
        let paused = next == PollState::Paused;
        feed.emit(FeedEvent::State {
            generation: feed.generation(),
            paused,
        });
        Ok(paused)
    }

    /// Wipe the auditor's log; the feed is only emptied once that succeeded
    pub async fn clear(&self) -> Result<(), ConsoleError> {
        let proxy_server = self.proxy_server().await;
        self.api.clear(&proxy_server).await?;

        if let Ok(feed) = self.feed().await {
            let rows = feed.len().await;
            feed.clear().await;
            tracing::debug!("Dropped {} rows from the feed", rows);
        }
        tracing::info!("Cleared transactions of proxy server {}", proxy_server);
        Ok(())
    }

    /// Flip an operator option; the local state only changes on success
    pub async fn toggle_option(&self, option: OperatorOption) -> Result<bool, ConsoleError> {
        let proxy_server = self.proxy_server().await;
        self.api.set_option(&proxy_server, option).await?;

        let mut options = self.options.write().await;
        let enabled = options
            .entry(proxy_server.clone())
            .or_default()
            .entry(option)
            .or_insert_with(|| default_option(option));
        *enabled = !*enabled;
        tracing::info!(
            "{} is now {} on proxy server {}",
            option.label(),
            if *enabled { "on" } else { "off" },
            proxy_server
        );
        Ok(*enabled)
    }

    /// Option state of the current proxy server
    pub async fn options(&self) -> Vec<(OperatorOption, bool)> {
        let proxy_server = self.proxy_server().await;
        let options = self.options.read().await;
        let saved = options.get(&proxy_server);
        OperatorOption::ALL
            .iter()
            .map(|o| {
                let enabled = saved
                    .and_then(|saved| saved.get(o).copied())
                    .unwrap_or_else(|| default_option(*o));
                (*o, enabled)
            })
            .collect()
    }

    pub async fn activate_row(&self, id: i64) -> Result<DetailOutcome, ConsoleError> {
        let feed = self.feed().await?;
        Ok(detail::activate(&feed, self.api.as_ref(), id).await?)
    }

    /// Activate every row; returns how many failed
    pub async fn toggle_all(&self) -> Result<usize, ConsoleError> {
        let feed = self.feed().await?;
        let failures = detail::activate_all(&feed, self.api.as_ref()).await;
        for (id, e) in &failures {
            tracing::warn!("Could not expand transaction {}: {}", id, e);
        }
        Ok(failures.len())
    }

    /// Blank form, or one prefilled from a feed row
    pub async fn emulation_form(&self, id: Option<i64>) -> Result<EmulationForm, ConsoleError> {
        let Some(id) = id else {
            return Ok(EmulationForm::blank());
        };

        let feed = self.feed().await?;
        let transaction = feed
            .transaction(id)
            .await
            .ok_or(ConsoleError::UnknownTransaction(id))?;
        Ok(EmulationForm::from_transaction(&transaction))
    }

    /// Replay a browser form submission through the current proxy server
    pub async fn submit_emulation(
        &self,
        fields: &[(String, String)],
    ) -> Result<EmulationOutcome, ConsoleError> {
        let (form, mode) = EmulationForm::from_submission(fields)?;
        let proxy_server = self.proxy_server().await;
        Ok(emulate::submit(self.api.as_ref(), &proxy_server, &form, mode).await?)
    }

    /// Run the current page's teardowns
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.leave();
        tracing::debug!("Console closed after {} page visits", lifecycle.generation());
    }
}
