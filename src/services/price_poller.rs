use crate::error::AppResult;
use crate::models::{FeedId, PriceQuote};
use crate::services::price_client::PriceSource;
use crate::state_manager::AppState;
use crate::websocket::{QuoteSource, WebSocketServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running poll task; cancel it before starting a replacement
pub struct PollerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Price poller task ended abnormally: {}", e);
        }
    }
}

/// Fetches the display quote for one feed on a fixed interval
pub struct PricePoller {
    price_source: Arc<dyn PriceSource>,
    state: Arc<AppState>,
    ws_server: Arc<WebSocketServer>,
    feed_id: FeedId,
    poll_interval: Duration,
}

impl PricePoller {
    pub fn new(
        price_source: Arc<dyn PriceSource>,
        state: Arc<AppState>,
        ws_server: Arc<WebSocketServer>,
        feed_id: FeedId,
    ) -> Self {
        Self {
            price_source,
            state,
            ws_server,
            feed_id,
            poll_interval: Duration::from_secs(10),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start polling in the background. The first poll runs immediately.
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            self.run(token).await;
        });
        PollerHandle { cancel, handle }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Price poller started for {}, polling every {:?}",
            self.feed_id, self.poll_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            // a cancelled fetch must not write a stale quote
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => {
                    if let Err(e) = result {
                        warn!("Price poll for {} failed: {}", self.feed_id, e);
                    }
                }
            }
        }

        info!("Price poller for {} stopped", self.feed_id);
    }

    /// Fetch once, record the quote, and broadcast it
    pub async fn poll_once(&self) -> AppResult<PriceQuote> {
        let quote = self.price_source.fetch_display_quote(&self.feed_id).await?;
        let Some(point) = self.state.record_quote_for(self.feed_id, quote).await? else {
            debug!("{} is no longer selected; dropped quote", self.feed_id);
            return Ok(quote);
        };
        debug!("{} -> {} at {}", self.feed_id, point.value, point.timestamp);

        self.ws_server
            .broadcast_price_update(self.feed_id, QuoteSource::Hermes, quote, Some(point));
        Ok(quote)
    }
}
