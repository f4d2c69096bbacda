//! EVM chain access for the price and entropy contracts
//!
//! The core never talks to a wallet directly. It sees a narrow
//! [`SigningConnection`] capability (accounts, signer, read call, send,
//! receipt) and builds calldata itself from the `sol!` bindings in
//! [`contracts`].

pub mod contracts;
pub mod json_rpc;

pub use alloy_primitives::{Address, Bytes, Log, TxHash, B256, U256};
pub use contracts::{EntropyContract, OnChainRequest, PriceContract};
pub use json_rpc::JsonRpcConnection;

use alloy_primitives::utils::format_ether as format_units_ether;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by a signing connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("no account connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("rejected by signer: {0}")]
    Rejected(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<alloy_sol_types::Error> for ChainError {
    fn from(err: alloy_sol_types::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

/// A contract call to be signed and submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub data: Bytes,
    /// Native value attached, in wei
    pub value: U256,
}

/// Confirmed transaction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// false when the transaction was mined but reverted
    pub success: bool,
    pub logs: Vec<Log>,
}

/// Wallet-side capability handed to the oracle and entropy services
#[async_trait]
pub trait SigningConnection: Send + Sync {
    /// Ask the wallet for its accounts; the first one becomes the signer
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError>;

    /// Currently connected signing account
    async fn signer(&self) -> Result<Address, ChainError>;

    /// Read-only contract call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Sign and broadcast a transaction from the signer account
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ChainError>;

    /// Wait until the transaction is mined
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ChainError>;
}

/// Send a transaction and wait for a successful receipt
pub async fn send_and_confirm(
    connection: &dyn SigningConnection,
    tx: TransactionRequest,
) -> Result<TransactionReceipt, ChainError> {
    let signer = connection.signer().await?;
    debug!("Submitting transaction from {} to {} (value: {} wei)", signer, tx.to, tx.value);

    let hash = connection.send_transaction(tx).await?;
    info!("Transaction submitted: {}", hash);

    let receipt = connection.wait_for_receipt(hash).await?;
    if !receipt.success {
        return Err(ChainError::Reverted(format!(
            "transaction {} reverted in block {}",
            receipt.transaction_hash, receipt.block_number
        )));
    }

    info!("Transaction {} confirmed in block {}", hash, receipt.block_number);
    Ok(receipt)
}

/// Format a wei amount as ether
pub fn format_ether(wei: U256) -> String {
    format_units_ether(wei)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_address_parsing() {
        let addr = Address::from_str("0x6CC14824Ea2918f5De5C2f75A9Da968ad4BD6344").unwrap();
        // prefix is optional
        let same = Address::from_str("6cc14824ea2918f5de5c2f75a9da968ad4bd6344").unwrap();
        assert_eq!(addr, same);

        assert!(Address::from_str("0x1234").is_err());
    }

    #[test]
    fn test_format_ether() {
        let one = U256::from(1_000_000_000_000_000_000u128);
        assert!(format_ether(one).starts_with("1.0"));
        assert!(format_ether(U256::from(1_500_000_000_000_000u128)).starts_with("0.0015"));
    }
}
