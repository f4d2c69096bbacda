//! User-action controller.
//!
//! Every operation here is the call site nearest a user action: failures are
//! logged, turned into a [`Notification`] for the browser, and returned.

use crate::chain_client::{Address, SigningConnection, TxHash, B256};
use crate::error::{AppError, AppResult};
use crate::models::{
    find_feed, ChatMessage, FeedId, Notification, PriceQuote, RandomnessRequest,
    RandomnessResult,
};
use crate::services::chat::{demo_reply, ChatBackend, WELCOME_MESSAGE};
use crate::services::oracle_updater::OracleUpdater;
use crate::services::price_client::PriceSource;
use crate::services::price_poller::{PollerHandle, PricePoller};
use crate::services::randomness::RandomnessClient;
use crate::state_manager::{AppState, InFlight};
use crate::websocket::{QuoteSource, WebSocketServer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands a browser client can issue
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DashboardCommand {
    ConnectWallet,
    SelectFeed { feed_id: String },
    SetPollInterval { secs: u64 },
    RefreshPrice,
    UpdatePrice,
    ReadOnChainPrice,
    RequestRandomness {
        #[serde(default)]
        commitment: Option<String>,
    },
    SendChat { text: String },
    SetApiKey {
        #[serde(default)]
        api_key: Option<String>,
    },
    ClearChat,
    GetSnapshot,
}

impl DashboardCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardCommand::ConnectWallet => "connect_wallet",
            DashboardCommand::SelectFeed { .. } => "select_feed",
            DashboardCommand::SetPollInterval { .. } => "set_poll_interval",
            DashboardCommand::RefreshPrice => "refresh_price",
            DashboardCommand::UpdatePrice => "update_price",
            DashboardCommand::ReadOnChainPrice => "read_on_chain_price",
            DashboardCommand::RequestRandomness { .. } => "request_randomness",
            DashboardCommand::SendChat { .. } => "send_chat",
            DashboardCommand::SetApiKey { .. } => "set_api_key",
            DashboardCommand::ClearChat => "clear_chat",
            DashboardCommand::GetSnapshot => "get_snapshot",
        }
    }
}

/// Randomness wait budget
#[derive(Debug, Clone, Copy)]
pub struct RandomnessPolling {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RandomnessPolling {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(5000),
        }
    }
}

pub struct Dashboard {
    state: Arc<AppState>,
    price_source: Arc<dyn PriceSource>,
    oracle: Arc<OracleUpdater>,
    randomness: Arc<RandomnessClient>,
    chat: Arc<dyn ChatBackend>,
    connection: Option<Arc<dyn SigningConnection>>,
    ws_server: Arc<WebSocketServer>,
    randomness_polling: RandomnessPolling,
    poller: Mutex<Option<PollerHandle>>,
    randomness_watch: Mutex<Option<CancellationToken>>,
}

impl Dashboard {
    pub fn new(
        state: Arc<AppState>,
        price_source: Arc<dyn PriceSource>,
        oracle: Arc<OracleUpdater>,
        randomness: Arc<RandomnessClient>,
        chat: Arc<dyn ChatBackend>,
        ws_server: Arc<WebSocketServer>,
    ) -> Self {
        Self {
            state,
            price_source,
            oracle,
            randomness,
            chat,
            connection: None,
            ws_server,
            randomness_polling: RandomnessPolling::default(),
            poller: Mutex::new(None),
            randomness_watch: Mutex::new(None),
        }
    }

    /// Attach the wallet-side signing capability
    pub fn with_connection(mut self, connection: Arc<dyn SigningConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_randomness_polling(mut self, polling: RandomnessPolling) -> Self {
        self.randomness_polling = polling;
        self
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn notify(&self, notification: Notification) {
        self.ws_server.broadcast_notification(notification);
    }

    fn surface<T>(&self, action: &str, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            warn!("{} failed: {}", action, e);
            self.notify(Notification::from_error(e));
        }
        result
    }

    async fn broadcast_snapshot(&self) {
        self.ws_server.broadcast_snapshot(self.state.snapshot().await);
    }

    /// Signing connection for a connected wallet
    async fn require_connection(&self) -> AppResult<Arc<dyn SigningConnection>> {
        if !self.state.wallet().await.connected {
            return Err(AppError::WalletNotConnected);
        }
        self.connection.clone().ok_or(AppError::WalletNotConnected)
    }

    /// Seed the assistant greeting into an empty transcript
    pub async fn seed_welcome(&self) {
        if self.state.chat_messages().await.is_empty() {
            self.state
                .add_chat_message(ChatMessage::assistant(WELCOME_MESSAGE))
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Wallet
    // ------------------------------------------------------------------

    pub async fn connect_wallet(&self) -> AppResult<Address> {
        let result = self.connect_wallet_inner().await;
        let result = self.surface("Connect wallet", result);
        if let Ok(address) = &result {
            self.notify(Notification::success(format!("Wallet connected: {}", address)));
            self.broadcast_snapshot().await;
        }
        result
    }

    async fn connect_wallet_inner(&self) -> AppResult<Address> {
        let connection = self
            .connection
            .as_ref()
            .ok_or(AppError::WalletNotConnected)?;

        let accounts = connection
            .request_accounts()
            .await
            .map_err(AppError::from_read)?;
        let address = accounts
            .first()
            .copied()
            .ok_or(AppError::WalletNotConnected)?;

        self.state.set_wallet_connected(address).await;
        Ok(address)
    }

    // ------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------

    /// (Re)start the scheduled price poll for the selected feed and interval
    pub async fn start_price_polling(&self) {
        let mut poller = self.poller.lock().await;
        if let Some(previous) = poller.take() {
            previous.shutdown().await;
        }

        let feed_id = self.state.selected_feed().await;
        let interval = self.state.poll_interval().await;
        let handle = PricePoller::new(
            self.price_source.clone(),
            self.state.clone(),
            self.ws_server.clone(),
            feed_id,
        )
        .with_poll_interval(interval)
        .spawn();

        *poller = Some(handle);
    }

    async fn stop_price_polling(&self) {
        if let Some(previous) = self.poller.lock().await.take() {
            previous.shutdown().await;
        }
    }

    pub async fn select_feed(&self, feed_id: FeedId) -> AppResult<()> {
        let result = match find_feed(&feed_id) {
            Some(_) => Ok(()),
            None => Err(AppError::Validation(format!("unknown price feed {}", feed_id))),
        };
        self.surface("Select feed", result)?;

        // the old feed's poller must stop before the selection changes
        self.stop_price_polling().await;
        self.state.set_selected_feed(feed_id).await;
        self.start_price_polling().await;
        self.broadcast_snapshot().await;
        Ok(())
    }

    pub async fn set_poll_interval(&self, interval: Duration) -> AppResult<()> {
        let result = if interval.is_zero() {
            Err(AppError::Validation("poll interval must be greater than 0".to_string()))
        } else {
            Ok(())
        };
        self.surface("Set poll interval", result)?;

        self.state.set_poll_interval(interval).await;
        self.start_price_polling().await;
        info!("Price poll interval set to {:?}", interval);
        Ok(())
    }

    /// One display fetch outside the schedule
    pub async fn refresh_price(&self) -> AppResult<PriceQuote> {
        let feed_id = self.state.selected_feed().await;
        let result = async {
            let quote = self.price_source.fetch_display_quote(&feed_id).await?;
            let point = self.state.record_quote_for(feed_id, quote).await?;
            Ok::<_, AppError>((quote, point))
        }
        .await;

        let (quote, point) = self.surface("Refresh price", result)?;
        match point {
            Some(point) => self.ws_server.broadcast_price_update(
                feed_id,
                QuoteSource::Hermes,
                quote,
                Some(point),
            ),
            None => debug!("Feed changed during refresh; dropped quote for {}", feed_id),
        }
        Ok(quote)
    }

    /// Push a fresh update on-chain, then show the settled quote. The
    /// displayed quote is untouched when the push fails.
    pub async fn update_price_on_chain(&self) -> AppResult<TxHash> {
        let Some(_guard) = self.state.try_begin(InFlight::PriceUpdate) else {
            return self.surface(
                "Update price",
                Err(AppError::Validation("a price update is already in progress".to_string())),
            );
        };
        self.broadcast_snapshot().await;

        let feed_id = self.state.selected_feed().await;
        let result = async {
            let connection = self.require_connection().await?;
            self.oracle.push_update(&feed_id, connection.as_ref()).await
        }
        .await;
        let tx_hash = self.surface("Update price", result)?;

        self.notify(Notification::success(format!(
            "Price updated successfully! Transaction: {}",
            tx_hash
        )));

        // the push stands even when the read-back fails
        let _ = self.read_on_chain_price().await;
        Ok(tx_hash)
    }

    pub async fn read_on_chain_price(&self) -> AppResult<PriceQuote> {
        let feed_id = self.state.selected_feed().await;
        let result = async {
            let connection = self.require_connection().await?;
            self.oracle.read_latest(&feed_id, connection.as_ref()).await
        }
        .await;
        let quote = self.surface("Read on-chain price", result)?;

        self.state.set_current_quote(quote).await;
        self.ws_server
            .broadcast_price_update(feed_id, QuoteSource::Chain, quote, None);

        let shown = quote
            .display_value()
            .map(|value| crate::models::format_price(value, 2))
            .unwrap_or_else(|_| quote.price.to_string());
        self.notify(Notification::info(format!("On-chain price: {}", shown)));
        Ok(quote)
    }

    // ------------------------------------------------------------------
    // Randomness
    // ------------------------------------------------------------------

    /// Submit a request, track it, and watch for fulfillment in the background.
    /// A previous watch is cancelled; only the newest request is tracked.
    pub async fn request_randomness(
        &self,
        commitment: Option<[u8; 32]>,
    ) -> AppResult<RandomnessRequest> {
        let Some(_guard) = self.state.try_begin(InFlight::Randomness) else {
            return self.surface(
                "Request randomness",
                Err(AppError::Validation("a randomness request is already being submitted".to_string())),
            );
        };

        let result = async {
            let connection = self.require_connection().await?;
            let request = self
                .randomness
                .submit_request(connection.as_ref(), commitment)
                .await?;
            Ok::<_, AppError>((connection, request))
        }
        .await;
        let (connection, request) = self.surface("Request randomness", result)?;

        self.state.set_randomness_request(request.clone()).await;
        self.ws_server.broadcast_randomness(request.clone(), None);
        self.notify(Notification::info(format!(
            "Random number requested! Request ID: {}. Waiting for fulfillment...",
            request.request_id
        )));

        let cancel = CancellationToken::new();
        if let Some(previous) = self.randomness_watch.lock().await.replace(cancel.clone()) {
            previous.cancel();
        }

        let watch = RandomnessWatch {
            client: self.randomness.clone(),
            state: self.state.clone(),
            ws_server: self.ws_server.clone(),
            polling: self.randomness_polling,
        };
        let tracked = request.clone();
        tokio::spawn(async move {
            watch.run(tracked, connection, cancel).await;
        });

        Ok(request)
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// Append the user's message and the assistant's answer. Without an API
    /// key the offline responder answers; with one, failures are reported as
    /// assistant text and never fall back to the offline responder.
    pub async fn send_chat(&self, text: &str) -> AppResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return self.surface(
                "Send chat",
                Err(AppError::Validation("message is empty".to_string())),
            );
        }

        let Some(_guard) = self.state.try_begin(InFlight::Chat) else {
            return self.surface(
                "Send chat",
                Err(AppError::Validation("waiting for the previous reply".to_string())),
            );
        };

        let user_message = ChatMessage::user(text);
        self.state.add_chat_message(user_message.clone()).await;
        self.ws_server.broadcast_chat_message(user_message);

        let reply = match self.state.api_key().await {
            None => Ok(demo_reply(text).to_string()),
            Some(api_key) => {
                let transcript = self.state.chat_messages().await;
                self.chat.converse(&transcript, &api_key).await
            }
        };

        let assistant = match &reply {
            Ok(content) => ChatMessage::assistant(content.clone()),
            Err(e) => ChatMessage::assistant(format!(
                "Sorry, I encountered an error: {}. Please check your API key and try again.",
                e
            )),
        };
        self.state.add_chat_message(assistant.clone()).await;
        self.ws_server.broadcast_chat_message(assistant);

        self.surface("Send chat", reply)
    }

    pub async fn set_api_key(&self, api_key: Option<String>) {
        self.state.set_api_key(api_key).await;
        let message = if self.state.api_key().await.is_some() {
            "API key saved for this session"
        } else {
            "API key cleared, using demo responses"
        };
        self.notify(Notification::info(message));
        self.broadcast_snapshot().await;
    }

    pub async fn clear_chat(&self) {
        self.state.clear_chat().await;
        self.broadcast_snapshot().await;
    }

    // ------------------------------------------------------------------
    // Dispatch and teardown
    // ------------------------------------------------------------------

    /// Run one browser command. Failures were already surfaced as notifications.
    pub async fn execute(&self, command: DashboardCommand) -> AppResult<()> {
        match command {
            DashboardCommand::ConnectWallet => self.connect_wallet().await.map(|_| ()),
            DashboardCommand::SelectFeed { feed_id } => {
                let parsed = feed_id
                    .parse::<FeedId>()
                    .map_err(|e| AppError::Validation(format!("invalid feed id: {}", e)));
                let feed_id = self.surface("Select feed", parsed)?;
                self.select_feed(feed_id).await
            }
            DashboardCommand::SetPollInterval { secs } => {
                self.set_poll_interval(Duration::from_secs(secs)).await
            }
            DashboardCommand::RefreshPrice => self.refresh_price().await.map(|_| ()),
            DashboardCommand::UpdatePrice => self.update_price_on_chain().await.map(|_| ()),
            DashboardCommand::ReadOnChainPrice => self.read_on_chain_price().await.map(|_| ()),
            DashboardCommand::RequestRandomness { commitment } => {
                let commitment = match commitment {
                    Some(hex_value) => Some(self.surface("Request randomness", parse_commitment(&hex_value))?),
                    None => None,
                };
                self.request_randomness(commitment).await.map(|_| ())
            }
            DashboardCommand::SendChat { text } => self.send_chat(&text).await.map(|_| ()),
            DashboardCommand::SetApiKey { api_key } => {
                self.set_api_key(api_key).await;
                Ok(())
            }
            DashboardCommand::ClearChat => {
                self.clear_chat().await;
                Ok(())
            }
            DashboardCommand::GetSnapshot => {
                self.broadcast_snapshot().await;
                Ok(())
            }
        }
    }

    /// Stop the price poller and any randomness watch
    pub async fn shutdown(&self) {
        self.stop_price_polling().await;
        if let Some(watch) = self.randomness_watch.lock().await.take() {
            watch.cancel();
        }
        info!("Dashboard stopped");
    }
}

fn parse_commitment(value: &str) -> AppResult<[u8; 32]> {
    value
        .parse::<B256>()
        .map(|commitment| commitment.0)
        .map_err(|e| AppError::Validation(format!("commitment must be 32 hex bytes: {}", e)))
}

/// Background wait for one randomness request
struct RandomnessWatch {
    client: Arc<RandomnessClient>,
    state: Arc<AppState>,
    ws_server: Arc<WebSocketServer>,
    polling: RandomnessPolling,
}

impl RandomnessWatch {
    async fn run(
        self,
        request: RandomnessRequest,
        connection: Arc<dyn SigningConnection>,
        cancel: CancellationToken,
    ) {
        let outcome = self
            .client
            .await_fulfillment(
                &request,
                connection.as_ref(),
                self.polling.max_attempts,
                self.polling.interval,
                cancel.clone(),
            )
            .await;

        match outcome {
            Ok(Some(result)) => self.fulfilled(result).await,
            Ok(None) if cancel.is_cancelled() => {}
            Ok(None) => {
                if self.state.mark_request_abandoned(request.request_id).await {
                    self.publish_tracked(None).await;
                    self.ws_server.broadcast_notification(Notification::warning(format!(
                        "Random number request {} was not fulfilled after {} attempts",
                        request.request_id, self.polling.max_attempts
                    )));
                }
            }
            Err(e) => {
                warn!("Resolving randomness request {} failed: {}", request.request_id, e);
                self.ws_server.broadcast_notification(Notification::from_error(&e));
            }
        }
    }

    async fn fulfilled(&self, result: RandomnessResult) {
        if !self.state.mark_request_fulfilled(result.clone()).await {
            return;
        }
        self.publish_tracked(Some(result.clone())).await;
        self.ws_server.broadcast_notification(Notification::success(format!(
            "Random number generated: {}",
            result.value_hex()
        )));
    }

    async fn publish_tracked(&self, result: Option<RandomnessResult>) {
        if let Some(request) = self.state.randomness_request().await {
            self.ws_server.broadcast_randomness(request, result);
        }
    }
}
