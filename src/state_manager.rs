//! Shared dashboard state.
//!
//! `AppState` is the explicit context object handed to every component as
//! `Arc<AppState>`. Each field sits behind its own lock and is only ever
//! replaced wholesale or appended to (bounded for price history), so
//! concurrent writers need no coordination beyond the per-field lock.

use crate::chain_client::Address;
use crate::error::AppResult;
use crate::models::{
    ChatMessage, FeedId, PriceHistory, PriceHistoryPoint, PriceQuote, RandomnessRequest,
    RandomnessResult, RequestStatus,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Wallet connection as seen by the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub connected: bool,
    pub address: Option<Address>,
}

/// Operations that show a busy indicator and must not be started twice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlight {
    Chat,
    PriceUpdate,
    Randomness,
}

/// Clears its in-flight flag when dropped
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Serializable view of the whole state, pushed to browser clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub wallet: WalletState,
    pub selected_feed: FeedId,
    pub poll_interval_secs: u64,
    pub current_quote: Option<PriceQuote>,
    pub price_history: Vec<PriceHistoryPoint>,
    pub chat_messages: Vec<ChatMessage>,
    pub demo_mode: bool,
    pub randomness_request: Option<RandomnessRequest>,
    pub random_result: Option<RandomnessResult>,
    pub loading_chat: bool,
    pub updating_price: bool,
    pub requesting_random: bool,
}

pub struct AppState {
    wallet: RwLock<WalletState>,
    selected_feed: RwLock<FeedId>,
    poll_interval: RwLock<Duration>,
    current_quote: RwLock<Option<PriceQuote>>,
    price_history: RwLock<PriceHistory>,
    chat_messages: RwLock<Vec<ChatMessage>>,
    api_key: RwLock<Option<String>>,
    randomness_request: RwLock<Option<RandomnessRequest>>,
    random_result: RwLock<Option<RandomnessResult>>,
    loading_chat: AtomicBool,
    updating_price: AtomicBool,
    requesting_random: AtomicBool,
}

impl AppState {
    pub fn new(selected_feed: FeedId, poll_interval: Duration) -> Self {
        Self {
            wallet: RwLock::new(WalletState::default()),
            selected_feed: RwLock::new(selected_feed),
            poll_interval: RwLock::new(poll_interval),
            current_quote: RwLock::new(None),
            price_history: RwLock::new(PriceHistory::new()),
            chat_messages: RwLock::new(Vec::new()),
            api_key: RwLock::new(None),
            randomness_request: RwLock::new(None),
            random_result: RwLock::new(None),
            loading_chat: AtomicBool::new(false),
            updating_price: AtomicBool::new(false),
            requesting_random: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Wallet
    // ------------------------------------------------------------------

    pub async fn set_wallet_connected(&self, address: Address) {
        *self.wallet.write().await = WalletState {
            connected: true,
            address: Some(address),
        };
        info!("Wallet connected: {}", address);
    }

    pub async fn set_wallet_disconnected(&self) {
        *self.wallet.write().await = WalletState::default();
    }

    pub async fn wallet(&self) -> WalletState {
        *self.wallet.read().await
    }

    // ------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------

    pub async fn selected_feed(&self) -> FeedId {
        *self.selected_feed.read().await
    }

    /// Switch feeds; the chart restarts since points of different assets don't mix
    pub async fn set_selected_feed(&self, feed_id: FeedId) {
        let mut selected = self.selected_feed.write().await;
        *selected = feed_id;
        *self.current_quote.write().await = None;
        self.price_history.write().await.clear();
        drop(selected);
        debug!("Selected feed {}", feed_id);
    }

    pub async fn poll_interval(&self) -> Duration {
        *self.poll_interval.read().await
    }

    pub async fn set_poll_interval(&self, interval: Duration) {
        *self.poll_interval.write().await = interval;
    }

    pub async fn current_quote(&self) -> Option<PriceQuote> {
        *self.current_quote.read().await
    }

    /// Replace the displayed quote (last write wins)
    pub async fn set_current_quote(&self, quote: PriceQuote) {
        *self.current_quote.write().await = Some(quote);
    }

    /// Append a chart point, evicting the oldest beyond capacity
    pub async fn push_history(&self, point: PriceHistoryPoint) {
        self.price_history.write().await.push(point);
    }

    /// Replace the quote and chart it in one step, as a display fetch does
    pub async fn record_quote(&self, quote: PriceQuote) -> AppResult<PriceHistoryPoint> {
        let point = PriceHistoryPoint::from_quote(&quote)?;
        self.set_current_quote(quote).await;
        self.push_history(point).await;
        Ok(point)
    }

    /// [`AppState::record_quote`] only while `feed_id` is still selected.
    /// `None` means the feed changed and the quote was dropped.
    ///
    /// Lock order is selected feed, then quote, then history, matching
    /// [`AppState::set_selected_feed`].
    pub async fn record_quote_for(
        &self,
        feed_id: FeedId,
        quote: PriceQuote,
    ) -> AppResult<Option<PriceHistoryPoint>> {
        let selected = self.selected_feed.read().await;
        if *selected != feed_id {
            return Ok(None);
        }
        let point = self.record_quote(quote).await?;
        drop(selected);
        Ok(Some(point))
    }

    pub async fn price_history(&self) -> Vec<PriceHistoryPoint> {
        self.price_history.read().await.to_vec()
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub async fn add_chat_message(&self, message: ChatMessage) {
        self.chat_messages.write().await.push(message);
    }

    pub async fn chat_messages(&self) -> Vec<ChatMessage> {
        self.chat_messages.read().await.clone()
    }

    /// Explicit user action only
    pub async fn clear_chat(&self) {
        self.chat_messages.write().await.clear();
    }

    /// Blank keys count as no key
    pub async fn set_api_key(&self, key: Option<String>) {
        let key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        *self.api_key.write().await = key;
    }

    pub async fn api_key(&self) -> Option<String> {
        self.api_key.read().await.clone()
    }

    // ------------------------------------------------------------------
    // Randomness
    // ------------------------------------------------------------------

    /// Track a new request, replacing whatever was tracked before
    pub async fn set_randomness_request(&self, request: RandomnessRequest) {
        *self.randomness_request.write().await = Some(request);
        *self.random_result.write().await = None;
    }

    pub async fn randomness_request(&self) -> Option<RandomnessRequest> {
        self.randomness_request.read().await.clone()
    }

    pub async fn random_result(&self) -> Option<RandomnessResult> {
        self.random_result.read().await.clone()
    }

    /// Record fulfillment for the tracked request. Ignored when `request_id`
    /// is no longer tracked or the request already left `Pending`.
    pub async fn mark_request_fulfilled(&self, result: RandomnessResult) -> bool {
        let mut tracked = self.randomness_request.write().await;
        let updated = match tracked.as_ref() {
            Some(request) if request.request_id == result.request_id => {
                let mut next = request.clone();
                next.transition(RequestStatus::Fulfilled).then_some(next)
            }
            _ => None,
        };

        match updated {
            Some(next) => {
                *tracked = Some(next);
                *self.random_result.write().await = Some(result);
                true
            }
            None => false,
        }
    }

    pub async fn mark_request_abandoned(&self, request_id: u64) -> bool {
        let mut tracked = self.randomness_request.write().await;
        let updated = match tracked.as_ref() {
            Some(request) if request.request_id == request_id => {
                let mut next = request.clone();
                next.transition(RequestStatus::Abandoned).then_some(next)
            }
            _ => None,
        };

        match updated {
            Some(next) => {
                *tracked = Some(next);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // In-flight flags
    // ------------------------------------------------------------------

    fn flag(&self, op: InFlight) -> &AtomicBool {
        match op {
            InFlight::Chat => &self.loading_chat,
            InFlight::PriceUpdate => &self.updating_price,
            InFlight::Randomness => &self.requesting_random,
        }
    }

    /// Mark `op` as running; `None` if it already is
    pub fn try_begin(&self, op: InFlight) -> Option<InFlightGuard<'_>> {
        let flag = self.flag(op);
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard { flag })
    }

    pub fn is_in_flight(&self, op: InFlight) -> bool {
        self.flag(op).load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            wallet: self.wallet().await,
            selected_feed: self.selected_feed().await,
            poll_interval_secs: self.poll_interval().await.as_secs(),
            current_quote: self.current_quote().await,
            price_history: self.price_history().await,
            chat_messages: self.chat_messages().await,
            demo_mode: self.api_key().await.is_none(),
            randomness_request: self.randomness_request().await,
            random_result: self.random_result().await,
            loading_chat: self.is_in_flight(InFlight::Chat),
            updating_price: self.is_in_flight(InFlight::PriceUpdate),
            requesting_random: self.is_in_flight(InFlight::Randomness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{find_by_symbol, DEFAULT_FEED};

    fn state() -> AppState {
        AppState::new(DEFAULT_FEED.feed_id().unwrap(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let state = state();
        for i in 0..25 {
            state
                .push_history(PriceHistoryPoint {
                    timestamp: i,
                    value: i as f64,
                })
                .await;
        }

        let history = state.price_history().await;
        assert_eq!(history.len(), 20);
        assert_eq!(history.first().unwrap().timestamp, 5);
        assert_eq!(history.last().unwrap().timestamp, 24);
    }

    #[tokio::test]
    async fn test_record_quote_updates_quote_and_history() {
        let state = state();
        let quote = PriceQuote {
            price: 123_450,
            conf: 10,
            expo: -2,
            publish_time: 1_700_000_000,
        };

        let point = state.record_quote(quote).await.unwrap();
        assert_eq!(point.timestamp, 1_700_000_000);
        assert!((point.value - 1234.5).abs() < 1e-9);
        assert_eq!(state.current_quote().await, Some(quote));
        assert_eq!(state.price_history().await, vec![point]);
    }

    #[tokio::test]
    async fn test_quote_for_other_feed_is_dropped() {
        let state = state();
        let other = find_by_symbol("ETH/USD").unwrap().feed_id().unwrap();
        let quote = PriceQuote {
            price: 300_000,
            conf: 5,
            expo: -2,
            publish_time: 1_700_000_000,
        };

        assert_eq!(state.record_quote_for(other, quote).await.unwrap(), None);
        assert_eq!(state.current_quote().await, None);
        assert!(state.price_history().await.is_empty());

        let selected = state.selected_feed().await;
        assert!(state.record_quote_for(selected, quote).await.unwrap().is_some());
        assert_eq!(state.current_quote().await, Some(quote));
    }

    #[tokio::test]
    async fn test_fulfillment_only_for_tracked_request() {
        let state = state();
        state
            .set_randomness_request(RandomnessRequest::new(7, [1; 32], 10))
            .await;

        let stale = RandomnessResult {
            value: [9; 32],
            request_id: 6,
        };
        assert!(!state.mark_request_fulfilled(stale).await);

        let result = RandomnessResult {
            value: [9; 32],
            request_id: 7,
        };
        assert!(state.mark_request_fulfilled(result.clone()).await);
        assert_eq!(
            state.randomness_request().await.unwrap().status,
            RequestStatus::Fulfilled
        );
        assert_eq!(state.random_result().await, Some(result));

        // terminal: abandonment can no longer apply
        assert!(!state.mark_request_abandoned(7).await);
    }

    #[tokio::test]
    async fn test_new_request_replaces_tracking() {
        let state = state();
        state
            .set_randomness_request(RandomnessRequest::new(1, [1; 32], 10))
            .await;
        state
            .mark_request_fulfilled(RandomnessResult {
                value: [2; 32],
                request_id: 1,
            })
            .await;

        state
            .set_randomness_request(RandomnessRequest::new(2, [3; 32], 11))
            .await;
        let tracked = state.randomness_request().await.unwrap();
        assert_eq!(tracked.request_id, 2);
        assert_eq!(tracked.status, RequestStatus::Pending);
        assert!(state.random_result().await.is_none());
    }

    #[tokio::test]
    async fn test_in_flight_guard() {
        let state = state();
        let guard = state.try_begin(InFlight::PriceUpdate);
        assert!(guard.is_some());
        assert!(state.try_begin(InFlight::PriceUpdate).is_none());
        assert!(state.try_begin(InFlight::Chat).is_some());

        drop(guard);
        assert!(!state.is_in_flight(InFlight::PriceUpdate));
    }

    #[tokio::test]
    async fn test_blank_api_key_means_demo_mode() {
        let state = state();
        state.set_api_key(Some("   ".to_string())).await;
        assert!(state.api_key().await.is_none());
        assert!(state.snapshot().await.demo_mode);

        state.set_api_key(Some(" sk-test ".to_string())).await;
        assert_eq!(state.api_key().await.as_deref(), Some("sk-test"));
    }
}
