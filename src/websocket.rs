use crate::error::{AppError, AppResult};
use crate::models::{
    format_price, FeedId, Notification, PriceHistoryPoint, PriceQuote, RandomnessRequest,
    RandomnessResult, ChatMessage,
};
use crate::services::dashboard::DashboardCommand;
use crate::state_manager::DashboardSnapshot;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const RANDOMNESS_CHANNEL: &str = "randomness";
pub const CHAT_CHANNEL: &str = "chat";
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";

pub fn feed_channel(feed_id: &FeedId) -> String {
    format!("feed:{}", feed_id)
}

/// Where a quote came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    /// Off-chain price service
    Hermes,
    /// Settled on-chain contract state
    Chain,
}

/// Messages pushed to browser clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    PriceUpdate {
        feed_id: FeedId,
        source: QuoteSource,
        quote: PriceQuote,
        display_price: String,
        history_point: Option<PriceHistoryPoint>,
        timestamp: i64,
    },
    RandomnessUpdate {
        request: RandomnessRequest,
        result: Option<RandomnessResult>,
    },
    ChatMessage {
        message: ChatMessage,
    },
    Notification {
        notification: Notification,
    },
    Snapshot {
        snapshot: Box<DashboardSnapshot>,
    },
}

impl WsMessage {
    /// Subscription channel this message is delivered on; `None` goes to everyone
    pub fn channel(&self) -> Option<String> {
        match self {
            WsMessage::PriceUpdate { feed_id, .. } => Some(feed_channel(feed_id)),
            WsMessage::RandomnessUpdate { .. } => Some(RANDOMNESS_CHANNEL.to_string()),
            WsMessage::ChatMessage { .. } => Some(CHAT_CHANNEL.to_string()),
            WsMessage::Notification { .. } => Some(NOTIFICATIONS_CHANNEL.to_string()),
            WsMessage::Snapshot { .. } => None,
        }
    }
}

/// Messages accepted from browser clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Command { command: DashboardCommand },
}

/// A command received from a specific client
#[derive(Debug, Clone)]
pub struct ClientCommand {
    pub client_id: Uuid,
    pub command: DashboardCommand,
}

/// WebSocket bridge between the dashboard and browser clients
pub struct WebSocketServer {
    /// Broadcast sender; each connection filters by its subscriptions
    tx: broadcast::Sender<WsMessage>,
    /// Active subscriptions: channel -> client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
    /// Forwarding target for client commands
    commands: Option<mpsc::Sender<ClientCommand>>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
            commands: None,
        }
    }

    /// Forward client commands to `commands`
    pub fn with_command_sender(mut self, commands: mpsc::Sender<ClientCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn sender(&self) -> broadcast::Sender<WsMessage> {
        self.tx.clone()
    }

    /// Publish a message; connections deliver it to subscribers of its channel
    pub fn publish(&self, message: WsMessage) {
        if self.tx.send(message).is_err() {
            debug!("No WebSocket listeners for message");
        }
    }

    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_default();
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }

        let channels = client_channels.entry(client_id).or_default();
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!("Client {} subscribed to {}", client_id, channel);
    }

    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.retain(|&id| id != client_id);
            if subscribers.is_empty() {
                subscriptions.remove(channel);
            }
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| c != channel);
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    pub async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .map(|subscribers| subscribers.contains(&client_id))
            .unwrap_or(false)
    }

    async fn should_deliver(&self, client_id: Uuid, message: &WsMessage) -> bool {
        match message.channel() {
            Some(channel) => self.is_client_subscribed(client_id, &channel).await,
            None => true,
        }
    }

    async fn forget_client(&self, client_id: Uuid) {
        for channel in self.get_client_channels(client_id).await {
            self.unsubscribe(client_id, &channel).await;
        }
        self.client_channels.write().await.remove(&client_id);
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));

        let server = self.clone();
        let reply_sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = server.handle_client_text(client_id, &text).await;
                        let mut sender = reply_sender.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to reply to client {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            server.forget_client(client_id).await;
        });

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} message(s)", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !server.should_deliver(client_id, &msg).await {
                    continue;
                }

                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Stopped sending to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    /// Apply one text frame from a client and return the acknowledgment
    pub async fn handle_client_text(&self, client_id: Uuid, text: &str) -> serde_json::Value {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse message from client {}: {}", client_id, e);
                return serde_json::json!({
                    "type": "error",
                    "message": "Invalid message format"
                });
            }
        };

        match message {
            ClientMessage::Subscribe { channel } => {
                self.subscribe(client_id, channel.clone()).await;
                serde_json::json!({ "type": "subscribed", "channel": channel })
            }
            ClientMessage::Unsubscribe { channel } => {
                self.unsubscribe(client_id, &channel).await;
                serde_json::json!({ "type": "unsubscribed", "channel": channel })
            }
            ClientMessage::Command { command } => {
                let name = command.name();
                let Some(commands) = &self.commands else {
                    warn!("Dropping command {} from {}: no dispatcher", name, client_id);
                    return serde_json::json!({
                        "type": "error",
                        "message": "Commands are not accepted"
                    });
                };

                match commands.send(ClientCommand { client_id, command }).await {
                    Ok(()) => serde_json::json!({ "type": "accepted", "command": name }),
                    Err(e) => {
                        error!("Command dispatcher gone: {}", e);
                        serde_json::json!({
                            "type": "error",
                            "message": "Dashboard is shutting down"
                        })
                    }
                }
            }
        }
    }

    pub fn broadcast_price_update(
        &self,
        feed_id: FeedId,
        source: QuoteSource,
        quote: PriceQuote,
        history_point: Option<PriceHistoryPoint>,
    ) {
        let display_price = quote
            .display_value()
            .map(|value| format_price(value, 2))
            .unwrap_or_else(|_| "-".to_string());

        self.publish(WsMessage::PriceUpdate {
            feed_id,
            source,
            quote,
            display_price,
            history_point,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    pub fn broadcast_randomness(&self, request: RandomnessRequest, result: Option<RandomnessResult>) {
        self.publish(WsMessage::RandomnessUpdate { request, result });
    }

    pub fn broadcast_chat_message(&self, message: ChatMessage) {
        self.publish(WsMessage::ChatMessage { message });
    }

    pub fn broadcast_notification(&self, notification: Notification) {
        self.publish(WsMessage::Notification { notification });
    }

    pub fn broadcast_snapshot(&self, snapshot: DashboardSnapshot) {
        self.publish(WsMessage::Snapshot {
            snapshot: Box::new(snapshot),
        });
    }
}

impl Clone for WebSocketServer {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
            commands: self.commands.clone(),
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}
