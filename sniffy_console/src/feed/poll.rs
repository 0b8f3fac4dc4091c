//! Incremental polling of the auditor's transaction log
//!
//! One task per feed view runs a flat loop: decide what this tick does, do
//! it, sleep for the interval. The next fetch is only issued once the
//! previous one has finished, so there is never more than one request in
//! flight.

use super::FeedView;
use crate::api::AuditorApi;
use sniffy_common::constants;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Poller state shared between the loop and its handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Paused,
    /// Terminal
    Stopped,
}

/// What a single tick of the loop does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Fetch,
    Skip,
    Exit,
}

impl PollState {
    pub fn on_tick(self) -> TickAction {
        match self {
            PollState::Running => TickAction::Fetch,
            PollState::Paused => TickAction::Skip,
            PollState::Stopped => TickAction::Exit,
        }
    }

    pub fn pause(self) -> Self {
        match self {
            PollState::Running => PollState::Paused,
            other => other,
        }
    }

    pub fn resume(self) -> Self {
        match self {
            PollState::Paused => PollState::Running,
            other => other,
        }
    }

    pub fn stop(self) -> Self {
        PollState::Stopped
    }
}

struct Shared {
    state: Mutex<PollState>,
    since: AtomicI64,
    finished: AtomicBool,
}

/// Control handle for a running poller
#[derive(Clone)]
pub struct PollHandle {
    shared: Arc<Shared>,
}

impl PollHandle {
    fn new(since: i64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PollState::Running),
                since: AtomicI64::new(since),
                finished: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, f: impl FnOnce(PollState) -> PollState) -> PollState {
        let mut state = self.lock();
        *state = f(*state);
        *state
    }

    pub fn state(&self) -> PollState {
        *self.lock()
    }

    pub fn pause(&self) -> PollState {
        self.transition(PollState::pause)
    }

    pub fn resume(&self) -> PollState {
        self.transition(PollState::resume)
    }

    /// Takes effect at the next tick boundary
    pub fn stop(&self) {
        self.transition(PollState::stop);
    }

    /// Current watermark
    pub fn since(&self) -> i64 {
        self.shared.since.load(Ordering::SeqCst)
    }

    /// True once the loop task has exited
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Move the watermark forward; a lower cursor is ignored
    fn advance(&self, next: i64) {
        let current = self.since();
        if next < current {
            tracing::warn!(
                "Auditor returned cursor {} below watermark {}, keeping watermark",
                next,
                current
            );
            return;
        }
        self.shared.since.store(next, Ordering::SeqCst);
    }
}

/// Polling loop of one feed view
pub struct PollSynchronizer {
    api: Arc<dyn AuditorApi>,
    feed: Arc<FeedView>,
    proxy_server: String,
    interval: Duration,
    handle: PollHandle,
}

impl PollSynchronizer {
    /// Start polling into `feed`.
    ///
    /// A feed view has a single poller slot; while its loop is alive this
    /// returns the existing handle instead of spawning a second loop.
    pub fn start(
        api: Arc<dyn AuditorApi>,
        feed: Arc<FeedView>,
        proxy_server: impl Into<String>,
        initial_since: i64,
        interval: Duration,
    ) -> PollHandle {
        let mut slot = feed
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref().filter(|h| !h.is_finished()) {
            return handle.clone();
        }

        let handle = PollHandle::new(initial_since);
        *slot = Some(handle.clone());
        drop(slot);

        let poller = Self {
            api,
            feed,
            proxy_server: proxy_server.into(),
            interval,
            handle: handle.clone(),
        };
        tracing::debug!(
            "Polling proxy server {} every {:?} from since={}",
            poller.proxy_server,
            interval,
            initial_since
        );
        tokio::spawn(poller.run());

        handle
    }

    async fn run(self) {
        loop {
            match self.handle.state().on_tick() {
                TickAction::Exit => break,
                TickAction::Skip => {}
                TickAction::Fetch => self.poll_once().await,
            }
            tokio::time::sleep(self.interval).await;
        }

        self.handle.shared.finished.store(true, Ordering::SeqCst);
        tracing::debug!("Poller for proxy server {} stopped", self.proxy_server);
    }

    async fn poll_once(&self) {
        let since = self.handle.since();

        let batch = match self.api.fetch_since(&self.proxy_server, since).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Poll of proxy server {} failed: {}", self.proxy_server, e);
                return;
            }
        };

        // paused or stopped while the request was out
        if self.handle.state() != PollState::Running {
            tracing::debug!("Discarding batch fetched since={}", since);
            return;
        }

        let next = batch.since;
        if !batch.is_empty() {
            let fresh = since > constants::INITIAL_SINCE;
            let added = self
                .feed
                .append_batch(batch.transactions, &batch.queued_ids, fresh)
                .await;
            tracing::debug!("Added {} rows, cursor {} -> {}", added, since, next);
        }
        self.handle.advance(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{transaction, MemoryAuditor};
    use crate::feed::FeedOrder;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn setup() -> (Arc<MemoryAuditor>, Arc<FeedView>) {
        let (tx, _) = broadcast::channel(64);
        (
            Arc::new(MemoryAuditor::new()),
            Arc::new(FeedView::new(1, FeedOrder::OldestFirst, tx)),
        )
    }

    fn start(api: &Arc<MemoryAuditor>, feed: &Arc<FeedView>) -> PollHandle {
        PollSynchronizer::start(api.clone(), feed.clone(), "1", 0, INTERVAL)
    }

    #[test]
    fn test_tick_state_machine() {
        assert_eq!(PollState::Running.on_tick(), TickAction::Fetch);
        assert_eq!(PollState::Paused.on_tick(), TickAction::Skip);
        assert_eq!(PollState::Stopped.on_tick(), TickAction::Exit);

        assert_eq!(PollState::Running.pause(), PollState::Paused);
        assert_eq!(PollState::Paused.resume(), PollState::Running);
        assert_eq!(PollState::Stopped.resume(), PollState::Stopped);
        assert_eq!(PollState::Paused.stop(), PollState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_then_cursor() {
        let (api, feed) = setup();
        api.push_batch(42, vec![transaction(1, 41), transaction(2, 42)], vec![])
            .await;
        api.push_batch(50, vec![transaction(3, 50)], vec![3]).await;

        let handle = start(&api, &feed);
        sleep(Duration::from_millis(250)).await;
        handle.stop();

        let sinces = api.sinces().await;
        assert_eq!(&sinces[..3], &[0, 42, 50]);
        assert_eq!(handle.since(), 50);
        assert_eq!(feed.ids().await, vec![1, 2, 3]);

        let rows = feed.feed.read().await;
        assert!(!rows.get(1).unwrap().fresh);
        assert!(!rows.get(2).unwrap().fresh);
        assert!(rows.get(3).unwrap().fresh);
        assert!(rows.get(3).unwrap().queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_cursor() {
        let (api, feed) = setup();
        api.push_failure().await;
        api.push_batch(42, vec![transaction(1, 42)], vec![]).await;

        let handle = start(&api, &feed);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(api.fetch_count().await, 1);
        assert_eq!(handle.since(), 0);
        assert_eq!(feed.len().await, 0);

        sleep(INTERVAL).await;
        assert_eq!(api.sinces().await[..2], [0, 0]);
        assert_eq!(handle.since(), 42);
        assert_eq!(feed.len().await, 1);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick() {
        let (api, feed) = setup();
        let handle = start(&api, &feed);
        handle.stop();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.fetch_count().await, 0);
        assert!(handle.is_finished());
        assert_eq!(handle.state(), PollState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wins_over_pause() {
        let (api, feed) = setup();
        let handle = start(&api, &feed);
        sleep(Duration::from_millis(50)).await;

        handle.pause();
        handle.stop();
        assert_eq!(handle.resume(), PollState::Stopped);

        let before = api.fetch_count().await;
        sleep(Duration::from_secs(2)).await;
        assert_eq!(api.fetch_count().await, before);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_then_resume() {
        let (api, feed) = setup();
        let handle = start(&api, &feed);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(api.fetch_count().await, 1);

        assert_eq!(handle.pause(), PollState::Paused);
        api.push_batch(42, vec![transaction(1, 40), transaction(2, 42)], vec![])
            .await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(api.fetch_count().await, 1);
        assert_eq!(feed.len().await, 0);
        assert_eq!(handle.since(), 0);

        assert_eq!(handle.resume(), PollState::Running);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(api.sinces().await[1], 0);
        assert_eq!(feed.ids().await, vec![1, 2]);
        assert_eq!(handle.since(), 42);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_discarded_when_paused_mid_fetch() {
        let (api, feed) = setup();
        api.set_fetch_delay(Duration::from_millis(100)).await;
        api.push_batch(42, vec![transaction(1, 42)], vec![]).await;

        let handle = start(&api, &feed);
        sleep(Duration::from_millis(50)).await;
        handle.pause();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(feed.len().await, 0);
        assert_eq!(handle.since(), 0);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_in_flight() {
        let (api, feed) = setup();
        api.set_fetch_delay(Duration::from_millis(350)).await;

        let handle = start(&api, &feed);
        sleep(Duration::from_secs(3)).await;
        handle.stop();

        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        // each cycle is fetch (350ms) plus interval (100ms)
        assert!(api.fetch_count().await <= 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_never_moves_back() {
        let (api, feed) = setup();
        api.push_batch(42, vec![transaction(1, 42)], vec![]).await;
        api.push_batch(10, vec![], vec![]).await;

        let handle = start(&api, &feed);
        sleep(Duration::from_millis(250)).await;
        handle.stop();

        assert_eq!(handle.since(), 42);
        assert_eq!(api.sinces().await[2], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_loop_per_feed_view() {
        let (api, feed) = setup();
        let first = start(&api, &feed);
        let second = start(&api, &feed);
        assert!(Arc::ptr_eq(&first.shared, &second.shared));

        sleep(Duration::from_millis(250)).await;
        assert!(api.fetch_count().await <= 3);

        first.stop();
        sleep(INTERVAL * 2).await;
        assert!(second.is_finished());
        assert!(feed.poller().is_some());
    }
}
