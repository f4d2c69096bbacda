//! [`SigningConnection`] over Ethereum JSON-RPC
//!
//! Targets a node or wallet endpoint that holds the account keys and signs
//! `eth_sendTransaction` itself, so no key material passes through this process.

use super::{
    Address, Bytes, ChainError, SigningConnection, TransactionReceipt, TransactionRequest, TxHash,
};
use alloy_primitives::U64;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// The receipt fields this crate reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    block_number: Option<U64>,
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<alloy_rpc_types_eth::Log>,
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(raw: RpcReceipt) -> Self {
        Self {
            transaction_hash: raw.transaction_hash,
            block_number: raw.block_number.map(|n| n.to::<u64>()).unwrap_or(0),
            // pre-byzantium receipts carry no status; treat them as successful
            success: raw.status.map(|s| s == U64::from(1)).unwrap_or(true),
            logs: raw.logs.into_iter().map(|log| log.inner).collect(),
        }
    }
}

/// Classify a JSON-RPC error object
pub fn classify_rpc_error(code: i64, message: &str, data: Option<&Value>) -> ChainError {
    let detail = match data {
        Some(Value::String(s)) => format!("{} ({})", message, s),
        _ => message.to_string(),
    };

    if code == 4001 {
        return ChainError::Rejected(detail);
    }
    if code == 4100 {
        return ChainError::NotConnected;
    }
    if code == 3 || message.to_lowercase().contains("revert") {
        return ChainError::Reverted(detail);
    }
    ChainError::Rpc(format!("{} (code {})", detail, code))
}

/// JSON-RPC backed signing connection
pub struct JsonRpcConnection {
    client: Client,
    rpc_url: String,
    account: RwLock<Option<Address>>,
    receipt_timeout: Duration,
    receipt_poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcConnection {
    pub fn new(rpc_url: String, receipt_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
            account: RwLock::new(None),
            receipt_timeout,
            receipt_poll_interval: Duration::from_secs(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set how often `wait_for_receipt` re-queries the node
    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Get RPC URL
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} (id {})", method, id);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(format!("{} request failed: {}", method, e)))?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{} response: {}", method, e)))?;

        if let Some(err) = parsed.error {
            return Err(classify_rpc_error(err.code, &err.message, err.data.as_ref()));
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn decode<T: DeserializeOwned>(value: Value, method: &str) -> Result<T, ChainError> {
        serde_json::from_value(value).map_err(|e| ChainError::Decode(format!("{} result: {}", method, e)))
    }
}

#[async_trait]
impl SigningConnection for JsonRpcConnection {
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError> {
        let result = match self.rpc("eth_requestAccounts", json!([])).await {
            Ok(value) => value,
            Err(ChainError::Rpc(msg)) => {
                // plain nodes don't implement the wallet method
                debug!("eth_requestAccounts unsupported ({}), falling back to eth_accounts", msg);
                self.rpc("eth_accounts", json!([])).await?
            }
            Err(e) => return Err(e),
        };

        let accounts: Vec<Address> = Self::decode(result, "accounts")?;

        let first = accounts.first().copied();
        *self.account.write().await = first;

        match first {
            Some(account) => info!("Connected account {}", account),
            None => warn!("Wallet returned no accounts"),
        }

        Ok(accounts)
    }

    async fn signer(&self) -> Result<Address, ChainError> {
        let account = *self.account.read().await;
        account.ok_or(ChainError::NotConnected)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let params = json!([{ "to": to, "data": data }, "latest"]);
        let result = self.rpc("eth_call", params).await?;
        Self::decode(result, "eth_call")
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ChainError> {
        let from = self.signer().await?;
        let params = json!([{
            "from": from,
            "to": tx.to,
            "data": tx.data,
            "value": tx.value,
        }]);
        let result = self.rpc("eth_sendTransaction", params).await?;
        Self::decode(result, "eth_sendTransaction")
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;

        loop {
            let result = self
                .rpc("eth_getTransactionReceipt", json!([hash]))
                .await?;

            if !result.is_null() {
                let raw: RpcReceipt = Self::decode(result, "eth_getTransactionReceipt")?;
                return Ok(raw.into());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::Timeout(format!(
                    "no receipt for {} after {:?}",
                    hash, self.receipt_timeout
                )));
            }

            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rpc_error() {
        assert_eq!(
            classify_rpc_error(4001, "User rejected the request.", None),
            ChainError::Rejected("User rejected the request.".to_string())
        );
        assert!(matches!(
            classify_rpc_error(3, "execution reverted", Some(&json!("0x19abf40e"))),
            ChainError::Reverted(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32000, "execution reverted: StalePrice", None),
            ChainError::Reverted(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32601, "method not found", None),
            ChainError::Rpc(_)
        ));
    }

    fn entropy_log(topic: String) -> Value {
        json!({
            "address": "0x549ebba8036ab746611b4ffa1423eb0a4df61440",
            "topics": [format!("0x{}", "00".repeat(32)), topic],
            "data": "0x",
            "blockHash": format!("0x{}", "11".repeat(32)),
            "blockNumber": "0x10",
            "blockTimestamp": "0x6553f100",
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "transactionIndex": "0x0",
            "logIndex": "0x3",
            "removed": false
        })
    }

    #[test]
    fn test_parse_receipt() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x1",
            "logs": [entropy_log(format!("0x{}{}", "00".repeat(31), "2a"))]
        }))
        .unwrap();

        let receipt = TransactionReceipt::from(raw);
        assert_eq!(receipt.transaction_hash, TxHash::repeat_byte(0xab));
        assert_eq!(receipt.block_number, 16);
        assert!(receipt.success);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].data.topics()[1][31], 0x2a);
    }

    #[test]
    fn test_parse_reverted_receipt() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "cd".repeat(32)),
            "blockNumber": "0x2",
            "status": "0x0",
            "logs": []
        }))
        .unwrap();

        assert!(!TransactionReceipt::from(raw).success);
    }

    #[test]
    fn test_receipt_without_status_is_success() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ef".repeat(32)),
            "blockNumber": "0x2"
        }))
        .unwrap();

        let receipt = TransactionReceipt::from(raw);
        assert!(receipt.success);
        assert!(receipt.logs.is_empty());
    }

    #[tokio::test]
    async fn test_signer_requires_accounts() {
        let conn = JsonRpcConnection::new("http://localhost:8545".to_string(), Duration::from_secs(5));
        assert_eq!(conn.signer().await, Err(ChainError::NotConnected));
    }
}
