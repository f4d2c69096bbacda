//! Oracle Dashboard Service
//!
//! Main entry point for the dashboard backend. This service provides:
//! - WebSocket bridge for browser clients (state pushes and user commands)
//! - Scheduled price polling against the price service
//! - On-chain price updates and randomness requests through a JSON-RPC node

use anyhow::Context;
use oracle_dashboard::chain_client::{EntropyContract, JsonRpcConnection, PriceContract};
use oracle_dashboard::config::AppConfig;
use oracle_dashboard::error::AppError;
use oracle_dashboard::models::DEFAULT_FEED;
use oracle_dashboard::services::{
    ChatClient, Dashboard, HermesClient, OracleUpdater, RandomnessClient, RandomnessPolling,
    RevealStrategy,
};
use oracle_dashboard::state_manager::AppState;
use oracle_dashboard::websocket::{ClientCommand, WebSocketServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "oracle_dashboard={},reqwest=warn,tokio_tungstenite=warn",
            config.log_level
        )
        .into()
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("Oracle dashboard starting");
    info!("Environment: {}", config.environment);
    info!("Price service: {}", config.hermes_url);
    info!("RPC endpoint: {}", config.chain.rpc_url);
    info!("Price contract: {}", config.chain.price_contract);
    info!(
        "Entropy contract: {} (provider {})",
        config.chain.entropy_contract, config.chain.entropy_provider
    );

    // =========================================================================
    // COMPONENTS
    // =========================================================================
    let default_feed = DEFAULT_FEED.feed_id().map_err(AppError::Config)?;
    let state = Arc::new(AppState::new(default_feed, config.polling.price_interval()));
    state.set_api_key(config.chat.api_key.clone()).await;
    if state.api_key().await.is_none() {
        info!("No CHAT_API_KEY set, assistant runs in demo mode");
    }

    let price_source = Arc::new(HermesClient::new(
        config.hermes_url.clone(),
        config.http_timeout(),
    ));

    let oracle = Arc::new(
        OracleUpdater::new(PriceContract::new(config.chain.price_contract), price_source.clone())
            .with_max_age(config.polling.price_max_age_secs),
    );

    let reveal = RevealStrategy::from_config(
        config.chain.fortuna_url.as_deref(),
        config.chain.fortuna_chain.as_deref(),
    );
    if reveal == RevealStrategy::Placeholder {
        warn!("FORTUNA_URL not set: fulfilled randomness uses a non-cryptographic placeholder value");
    }
    let randomness = Arc::new(
        RandomnessClient::new(EntropyContract::new(
            config.chain.entropy_contract,
            config.chain.entropy_provider,
        ))
        .with_reveal_strategy(reveal)
        .with_http_timeout(config.http_timeout()),
    );

    let chat = Arc::new(ChatClient::new(
        config.chat.api_url.clone(),
        config.chat.model.clone(),
    ));

    let connection = Arc::new(JsonRpcConnection::new(
        config.chain.rpc_url.clone(),
        config.chain.receipt_timeout(),
    ));

    let (command_tx, mut command_rx) = mpsc::channel::<ClientCommand>(64);
    let ws_server = Arc::new(WebSocketServer::new().with_command_sender(command_tx));

    let dashboard = Arc::new(
        Dashboard::new(
            state.clone(),
            price_source,
            oracle,
            randomness,
            chat,
            ws_server.clone(),
        )
        .with_connection(connection)
        .with_randomness_polling(RandomnessPolling {
            max_attempts: config.polling.randomness_max_attempts,
            interval: config.polling.randomness_interval(),
        }),
    );

    dashboard.seed_welcome().await;
    dashboard.start_price_polling().await;
    info!(
        "Price poller started ({} every {:?})",
        DEFAULT_FEED.symbol,
        config.polling.price_interval()
    );

    // =========================================================================
    // COMMAND DISPATCH
    // =========================================================================
    let dispatcher = dashboard.clone();
    let command_handle = tokio::spawn(async move {
        while let Some(ClientCommand { client_id, command }) = command_rx.recv().await {
            info!("Command {} from {}", command.name(), client_id);
            let dashboard = dispatcher.clone();
            // user actions interleave; each one reports its own failure
            tokio::spawn(async move {
                let _ = dashboard.execute(command).await;
            });
        }
    });

    // =========================================================================
    // WEBSOCKET SERVER
    // =========================================================================
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid WebSocket address: {}", e)))?;

    let listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("Failed to bind WebSocket server on {}", ws_addr))?;

    let ws_handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New WebSocket connection from {}", addr);
                    let ws = ws_server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = ws.handle_connection(stream).await {
                            error!("WebSocket connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("WebSocket accept error: {}", e);
                }
            }
        }
    });

    info!("WebSocket server listening on {}", ws_addr);
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = ws_handle => {
            error!("WebSocket server exited unexpectedly");
        }
        _ = command_handle => {
            error!("Command dispatcher exited unexpectedly");
        }
    }

    dashboard.shutdown().await;
    info!("Oracle dashboard shutdown complete");
    Ok(())
}
