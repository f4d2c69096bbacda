use crate::chain_client::{
    format_ether, send_and_confirm, EntropyContract, SigningConnection, TransactionRequest, B256,
    U256,
};
use crate::error::{AppError, AppResult};
use crate::models::{generate_commitment, RandomnessRequest, RandomnessResult};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the final random value is obtained once a request is fulfilled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealStrategy {
    /// Locally generated bytes. Not verifiable and not secure.
    Placeholder,
    /// Two-party reveal: fetch the provider's revelation from its HTTP
    /// service, then submit it with the user commitment to `reveal`
    Provider { url: String, chain: String },
}

impl RevealStrategy {
    pub fn from_config(fortuna_url: Option<&str>, fortuna_chain: Option<&str>) -> Self {
        match (fortuna_url, fortuna_chain) {
            (Some(url), Some(chain)) => RevealStrategy::Provider {
                url: url.trim_end_matches('/').to_string(),
                chain: chain.to_string(),
            },
            _ => RevealStrategy::Placeholder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RevelationResponse {
    value: RevelationValue,
}

#[derive(Debug, Deserialize)]
struct RevelationValue {
    data: String,
}

/// Extract the 32-byte provider revelation from a provider service response
pub fn parse_revelation(body: &str) -> AppResult<[u8; 32]> {
    let response: RevelationResponse = serde_json::from_str(body).map_err(|e| {
        AppError::UpstreamUnavailable(format!("malformed revelation response: {}", e))
    })?;

    B256::from_str(&response.value.data)
        .map(|revelation| revelation.0)
        .map_err(|e| {
            AppError::UpstreamUnavailable(format!(
                "revelation must be 32 hex bytes, got {:?}: {}",
                response.value.data, e
            ))
        })
}

/// Submits entropy requests and tracks them until fulfilled or abandoned
pub struct RandomnessClient {
    contract: EntropyContract,
    reveal: RevealStrategy,
    http: Client,
    http_timeout: Duration,
    /// Most recent sequence number observed fulfilled
    last_fulfilled: RwLock<Option<u64>>,
}

impl RandomnessClient {
    pub fn new(contract: EntropyContract) -> Self {
        Self {
            contract,
            reveal: RevealStrategy::Placeholder,
            http: Client::new(),
            http_timeout: Duration::from_secs(10),
            last_fulfilled: RwLock::new(None),
        }
    }

    pub fn with_reveal_strategy(mut self, reveal: RevealStrategy) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn reveal_strategy(&self) -> &RevealStrategy {
        &self.reveal
    }

    /// Current provider fee in wei
    pub async fn entropy_fee(&self, connection: &dyn SigningConnection) -> AppResult<u128> {
        let data = connection
            .call(self.contract.address, self.contract.get_fee())
            .await
            .map_err(AppError::from_read)?;
        self.contract.decode_fee(&data).map_err(AppError::from_read)
    }

    /// Pay the provider fee and submit a request. A commitment is generated
    /// when none is supplied.
    pub async fn submit_request(
        &self,
        connection: &dyn SigningConnection,
        commitment: Option<[u8; 32]>,
    ) -> AppResult<RandomnessRequest> {
        connection.signer().await.map_err(AppError::from_submission)?;

        let commitment = commitment.unwrap_or_else(generate_commitment);

        let fee_data = connection
            .call(self.contract.address, self.contract.get_fee())
            .await
            .map_err(AppError::from_submission)?;
        let fee = self
            .contract
            .decode_fee(&fee_data)
            .map_err(AppError::from_submission)?;
        info!("Requesting randomness, provider fee {} ETH", format_ether(U256::from(fee)));

        let tx = TransactionRequest {
            to: self.contract.address,
            data: self.contract.request(B256::from(commitment), true),
            value: U256::from(fee),
        };
        let receipt = send_and_confirm(connection, tx)
            .await
            .map_err(AppError::from_submission)?;

        let sequence_number = self
            .contract
            .sequence_from_receipt(&receipt)
            .map_err(|e| {
                AppError::ChainSubmissionFailed(format!(
                    "request {} confirmed without a sequence number: {}",
                    receipt.transaction_hash, e
                ))
            })?;

        info!(
            "Randomness request {} submitted in block {}",
            sequence_number, receipt.block_number
        );
        Ok(RandomnessRequest::new(
            sequence_number,
            commitment,
            receipt.block_number,
        ))
    }

    /// Whether the contract records fulfillment for `request_id`. Repeat
    /// polls for the most recently fulfilled request skip the chain.
    pub async fn poll_once(
        &self,
        request_id: u64,
        connection: &dyn SigningConnection,
    ) -> AppResult<bool> {
        if *self.last_fulfilled.read().await == Some(request_id) {
            return Ok(true);
        }

        let data = connection
            .call(self.contract.address, self.contract.get_request(request_id))
            .await
            .map_err(AppError::from_read)?;
        let on_chain = self
            .contract
            .decode_request(&data)
            .map_err(AppError::from_read)?;

        if on_chain.fulfilled {
            *self.last_fulfilled.write().await = Some(request_id);
        }
        Ok(on_chain.fulfilled)
    }

    /// Poll until fulfilled, at most `max_attempts` times with `interval`
    /// between polls. `Ok(None)` means the budget ran out (the request is
    /// abandoned) or `cancel` fired.
    pub async fn await_fulfillment(
        &self,
        request: &RandomnessRequest,
        connection: &dyn SigningConnection,
        max_attempts: u32,
        interval: Duration,
        cancel: CancellationToken,
    ) -> AppResult<Option<RandomnessResult>> {
        let request_id = request.request_id;

        for attempt in 1..=max_attempts {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stopped waiting for randomness request {}", request_id);
                    return Ok(None);
                }
                polled = self.poll_once(request_id, connection) => polled,
            };

            match polled {
                Ok(true) => {
                    info!(
                        "Randomness request {} fulfilled after {} poll(s)",
                        request_id, attempt
                    );
                    return self.resolve(request, connection).await.map(Some);
                }
                Ok(false) => {
                    debug!(
                        "Randomness request {} pending ({}/{})",
                        request_id, attempt, max_attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Poll {}/{} for request {} failed: {}",
                        attempt, max_attempts, request_id, e
                    );
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Stopped waiting for randomness request {}", request_id);
                        return Ok(None);
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        warn!(
            "Randomness request {} not fulfilled after {} attempts",
            request_id, max_attempts
        );
        Ok(None)
    }

    async fn resolve(
        &self,
        request: &RandomnessRequest,
        connection: &dyn SigningConnection,
    ) -> AppResult<RandomnessResult> {
        let value = match &self.reveal {
            RevealStrategy::Placeholder => {
                warn!(
                    "Using placeholder random value for request {}: not derived from the provider, not verifiable",
                    request.request_id
                );
                rand::random::<[u8; 32]>()
            }
            RevealStrategy::Provider { url, chain } => {
                let revelation = self
                    .fetch_revelation(url, chain, request.request_id)
                    .await?;
                self.reveal_on_chain(request, &revelation, connection)
                    .await?
            }
        };

        Ok(RandomnessResult {
            value,
            request_id: request.request_id,
        })
    }

    async fn fetch_revelation(&self, url: &str, chain: &str, sequence_number: u64) -> AppResult<[u8; 32]> {
        let endpoint = format!("{}/v1/chains/{}/revelations/{}", url, chain, sequence_number);
        debug!("Fetching provider revelation from {}", endpoint);

        let response = self
            .http
            .get(&endpoint)
            .timeout(self.http_timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("revelation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "provider service returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("revelation read failed: {}", e)))?;
        parse_revelation(&body)
    }

    /// Evaluate `reveal` as a call for the authoritative value, then submit it
    async fn reveal_on_chain(
        &self,
        request: &RandomnessRequest,
        revelation: &[u8; 32],
        connection: &dyn SigningConnection,
    ) -> AppResult<[u8; 32]> {
        let data = self.contract.reveal(
            request.request_id,
            B256::from(request.user_commitment),
            B256::from(*revelation),
        );

        let returned = connection
            .call(self.contract.address, data.clone())
            .await
            .map_err(AppError::from_submission)?;
        let value = self
            .contract
            .decode_reveal(&returned)
            .map_err(AppError::from_submission)?;

        let tx = TransactionRequest {
            to: self.contract.address,
            data,
            value: U256::ZERO,
        };
        let receipt = send_and_confirm(connection, tx)
            .await
            .map_err(AppError::from_submission)?;

        info!(
            "Revealed randomness for request {} in tx {}",
            request.request_id, receipt.transaction_hash
        );
        Ok(value.0)
    }
}
