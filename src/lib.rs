//! Oracle Dashboard Library
//!
//! Backend for a pull-oracle price dashboard: off-chain quotes, on-chain
//! price updates, verifiable randomness requests, and an assistant chat.
//! Exposed as a library for the binary and for tests.

pub mod chain_client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state_manager;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use state_manager::{AppState, DashboardSnapshot};
