#![allow(dead_code)]

use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use oracle_dashboard::chain_client::contracts::{IEntropy, IPyth};
use oracle_dashboard::chain_client::{
    Address, Bytes, ChainError, EntropyContract, Log, PriceContract, SigningConnection,
    TransactionReceipt, TransactionRequest, TxHash, B256, U256,
};
use oracle_dashboard::error::{AppError, AppResult};
use oracle_dashboard::models::{ChatMessage, FeedId, PriceQuote, DEFAULT_FEED};
use oracle_dashboard::services::{
    ChatBackend, Dashboard, OracleUpdater, PriceSource, RandomnessClient, RandomnessPolling,
};
use oracle_dashboard::state_manager::AppState;
use oracle_dashboard::websocket::{WebSocketServer, WsMessage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const ACCOUNT: Address = Address::new([0x01; 20]);
pub const PRICE_CONTRACT: Address = Address::new([0xaa; 20]);
pub const ENTROPY_CONTRACT: Address = Address::new([0xee; 20]);
pub const PROVIDER: Address = Address::new([0x77; 20]);

pub const UPDATE_FEE: u128 = 1_000;
pub const ENTROPY_FEE: u128 = 2_500;
pub const SEQUENCE_NUMBER: u64 = 4242;
pub const REVEALED_VALUE: B256 = B256::new([0x42; 32]);

pub fn default_feed() -> FeedId {
    DEFAULT_FEED.feed_id().unwrap()
}

pub fn sample_quote() -> PriceQuote {
    PriceQuote {
        price: 123_450,
        conf: 10,
        expo: -2,
        publish_time: 1_700_000_000,
    }
}

pub fn has_selector(data: &[u8], selector: [u8; 4]) -> bool {
    data.len() >= 4 && data[..4] == selector
}

/// ABI return data of `getPriceNoOlderThan`
pub fn encode_settled_quote(quote: &PriceQuote) -> Bytes {
    IPyth::Price {
        price: quote.price,
        conf: quote.conf,
        expo: quote.expo,
        publishTime: U256::from(quote.publish_time as u64),
    }
    .abi_encode()
    .into()
}

/// Scripted stand-in for a wallet-backed JSON-RPC node
pub struct MockConnection {
    connected: AtomicBool,
    settled_quote: Mutex<Option<PriceQuote>>,
    fulfillment_script: Mutex<VecDeque<Option<bool>>>,
    send_failure: Mutex<Option<ChainError>>,
    emit_sequence_log: AtomicBool,
    pub get_request_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub sent: Mutex<Vec<TransactionRequest>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            settled_quote: Mutex::new(None),
            fulfillment_script: Mutex::new(VecDeque::new()),
            send_failure: Mutex::new(None),
            emit_sequence_log: AtomicBool::new(true),
            get_request_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Already authorized, as after `request_accounts`
    pub fn connected() -> Self {
        let connection = Self::new();
        connection.connected.store(true, Ordering::SeqCst);
        connection
    }

    pub fn with_settled_quote(self, quote: PriceQuote) -> Self {
        *self.settled_quote.lock().unwrap() = Some(quote);
        self
    }

    /// Successive `getRequest` results; `None` is a transport failure.
    /// Once exhausted the request stays unfulfilled.
    pub fn with_fulfillment_script(self, script: Vec<Option<bool>>) -> Self {
        *self.fulfillment_script.lock().unwrap() = script.into();
        self
    }

    pub fn failing_send(self, error: ChainError) -> Self {
        *self.send_failure.lock().unwrap() = Some(error);
        self
    }

    pub fn without_sequence_log(self) -> Self {
        self.emit_sequence_log.store(false, Ordering::SeqCst);
        self
    }

    pub fn get_request_count(&self) -> usize {
        self.get_request_calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SigningConnection for MockConnection {
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(vec![ACCOUNT])
    }

    async fn signer(&self) -> Result<Address, ChainError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(ACCOUNT)
        } else {
            Err(ChainError::NotConnected)
        }
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        if has_selector(&data, IPyth::getUpdateFeeCall::SELECTOR) {
            return Ok(U256::from(UPDATE_FEE).abi_encode().into());
        }
        if has_selector(&data, IPyth::getPriceNoOlderThanCall::SELECTOR) {
            return match *self.settled_quote.lock().unwrap() {
                Some(quote) => Ok(encode_settled_quote(&quote)),
                None => Err(ChainError::Reverted("StalePrice".to_string())),
            };
        }
        if has_selector(&data, IEntropy::getFeeCall::SELECTOR) {
            return Ok(ENTROPY_FEE.abi_encode().into());
        }
        if has_selector(&data, IEntropy::getRequestCall::SELECTOR) {
            self.get_request_calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .fulfillment_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Some(false));
            return match next {
                Some(fulfilled) => Ok((B256::new([0x0c; 32]), 100u64, fulfilled).abi_encode().into()),
                None => Err(ChainError::Transport("connection reset".to_string())),
            };
        }
        if has_selector(&data, IEntropy::revealCall::SELECTOR) {
            return Ok(REVEALED_VALUE.abi_encode().into());
        }
        Err(ChainError::Rpc("unexpected call".to_string()))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ChainError> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.send_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(tx);
        Ok(TxHash::new([n as u8; 32]))
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ChainError> {
        let last = self.sent.lock().unwrap().last().cloned();
        let is_entropy_request = last
            .as_ref()
            .map(|tx| {
                tx.to == ENTROPY_CONTRACT && has_selector(&tx.data, IEntropy::requestCall::SELECTOR)
            })
            .unwrap_or(false);

        let logs = if is_entropy_request && self.emit_sequence_log.load(Ordering::SeqCst) {
            vec![Log::new_unchecked(
                ENTROPY_CONTRACT,
                vec![B256::new([0x99; 32]), B256::from(U256::from(SEQUENCE_NUMBER))],
                Bytes::new(),
            )]
        } else {
            Vec::new()
        };

        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: 100,
            success: true,
            logs,
        })
    }
}

/// Price service returning a fixed quote and payload
pub struct MockPriceSource {
    quote: Mutex<Option<PriceQuote>>,
    pub display_calls: AtomicUsize,
    pub payload_calls: AtomicUsize,
}

impl MockPriceSource {
    pub fn new(quote: PriceQuote) -> Self {
        Self {
            quote: Mutex::new(Some(quote)),
            display_calls: AtomicUsize::new(0),
            payload_calls: AtomicUsize::new(0),
        }
    }

    /// Every request fails as if the service were down
    pub fn unavailable() -> Self {
        Self {
            quote: Mutex::new(None),
            display_calls: AtomicUsize::new(0),
            payload_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_quote(&self, quote: PriceQuote) {
        *self.quote.lock().unwrap() = Some(quote);
    }

    pub fn display_count(&self) -> usize {
        self.display_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn fetch_display_quote(&self, _feed_id: &FeedId) -> AppResult<PriceQuote> {
        self.display_calls.fetch_add(1, Ordering::SeqCst);
        let quote = *self.quote.lock().unwrap();
        quote.ok_or_else(|| AppError::UpstreamUnavailable("price service down".to_string()))
    }

    async fn fetch_update_payload(&self, _feed_id: &FeedId) -> AppResult<Vec<Vec<u8>>> {
        self.payload_calls.fetch_add(1, Ordering::SeqCst);
        if self.quote.lock().unwrap().is_none() {
            return Err(AppError::UpstreamUnavailable("price service down".to_string()));
        }
        Ok(vec![vec![0x50, 0x4e, 0x41, 0x55]])
    }
}

/// Chat backend recording what it was sent
pub struct MockChat {
    reply: Option<String>,
    pub calls: AtomicUsize,
    pub last_transcript: Mutex<Vec<ChatMessage>>,
}

impl MockChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_transcript: Mutex::new(Vec::new()),
        }
    }

    /// Answers with zero choices
    pub fn empty() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn converse(&self, transcript: &[ChatMessage], _api_key: &str) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_transcript.lock().unwrap() = transcript.to_vec();
        self.reply.clone().ok_or(AppError::EmptyCompletion)
    }
}

pub fn price_contract() -> PriceContract {
    PriceContract::new(PRICE_CONTRACT)
}

pub fn entropy_contract() -> EntropyContract {
    EntropyContract::new(ENTROPY_CONTRACT, PROVIDER)
}

/// Dashboard wired to mocks, with a receiver for everything it broadcasts
pub struct TestDashboard {
    pub dashboard: Dashboard,
    pub state: Arc<AppState>,
    pub connection: Arc<MockConnection>,
    pub prices: Arc<MockPriceSource>,
    pub chat: Arc<MockChat>,
    pub messages: broadcast::Receiver<WsMessage>,
}

impl TestDashboard {
    pub fn new(connection: MockConnection, prices: MockPriceSource, chat: MockChat) -> Self {
        let state = Arc::new(AppState::new(default_feed(), Duration::from_secs(10)));
        let connection = Arc::new(connection);
        let prices = Arc::new(prices);
        let chat = Arc::new(chat);
        let ws_server = Arc::new(WebSocketServer::new());
        let messages = ws_server.sender().subscribe();

        let oracle = Arc::new(OracleUpdater::new(price_contract(), prices.clone()));
        let randomness = Arc::new(RandomnessClient::new(entropy_contract()));

        let dashboard = Dashboard::new(
            state.clone(),
            prices.clone(),
            oracle,
            randomness,
            chat.clone(),
            ws_server,
        )
        .with_connection(connection.clone())
        .with_randomness_polling(RandomnessPolling {
            max_attempts: 3,
            interval: Duration::from_millis(10),
        });

        Self {
            dashboard,
            state,
            connection,
            prices,
            chat,
            messages,
        }
    }

    /// Drain broadcast messages received so far
    pub fn drain(&mut self) -> Vec<WsMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            out.push(message);
        }
        out
    }
}

/// Re-check `condition` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Answer exactly one HTTP request on a local port with `status` and a JSON
/// `body`. Yields the base URL and, once served, the request line.
pub async fn serve_once(status: u16, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        String::from_utf8_lossy(&request)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    });

    (url, handle)
}
