use crate::chain_client::{
    format_ether, send_and_confirm, ChainError, PriceContract, SigningConnection,
    TransactionRequest, TxHash,
};
use crate::error::{AppError, AppResult};
use crate::models::{FeedId, PriceQuote};
use crate::services::price_client::PriceSource;
use std::sync::Arc;
use tracing::{info, warn};

/// Default age bound for reading a settled quote
pub const DEFAULT_MAX_AGE_SECS: u64 = 60;

/// Pushes signed price updates on-chain and reads back the settled quote
pub struct OracleUpdater {
    contract: PriceContract,
    price_source: Arc<dyn PriceSource>,
    max_age_secs: u64,
}

impl OracleUpdater {
    pub fn new(contract: PriceContract, price_source: Arc<dyn PriceSource>) -> Self {
        Self {
            contract,
            price_source,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }

    /// Set the default age bound used by [`OracleUpdater::read_latest`]
    pub fn with_max_age(mut self, max_age_secs: u64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Fetch the update payload, pay exactly the quoted fee, and wait for
    /// confirmation. Each call submits a new transaction.
    pub async fn push_update(
        &self,
        feed_id: &FeedId,
        connection: &dyn SigningConnection,
    ) -> AppResult<TxHash> {
        let signer = connection.signer().await.map_err(AppError::from_submission)?;

        let payload = self.price_source.fetch_update_payload(feed_id).await?;

        let fee_data = connection
            .call(self.contract.address, self.contract.get_update_fee(&payload))
            .await
            .map_err(AppError::from_submission)?;
        let fee = self
            .contract
            .decode_fee(&fee_data)
            .map_err(AppError::from_submission)?;
        info!(
            "Update fee for {}: {} ETH (signer {})",
            feed_id,
            format_ether(fee),
            signer
        );

        let tx = TransactionRequest {
            to: self.contract.address,
            data: self.contract.update_price_feeds(&payload),
            value: fee,
        };

        let receipt = send_and_confirm(connection, tx).await.map_err(|e| {
            warn!("Price update for {} failed: {}", feed_id, e);
            AppError::from_submission(e)
        })?;

        info!(
            "Price feed {} updated on-chain in tx {}",
            feed_id, receipt.transaction_hash
        );
        Ok(receipt.transaction_hash)
    }

    /// Read the contract's stored quote, rejected contract-side when older
    /// than `max_age_secs`
    pub async fn read_settled_quote(
        &self,
        feed_id: &FeedId,
        connection: &dyn SigningConnection,
        max_age_secs: u64,
    ) -> AppResult<PriceQuote> {
        let data = connection
            .call(
                self.contract.address,
                self.contract.get_price_no_older_than(feed_id, max_age_secs),
            )
            .await
            .map_err(|e| match e {
                ChainError::Reverted(reason) => AppError::StaleOrMissingQuote(format!(
                    "{} (max age {}s): {}",
                    feed_id, max_age_secs, reason
                )),
                other => AppError::from_read(other),
            })?;

        let quote = self
            .contract
            .decode_price(&data)
            .map_err(AppError::from_read)?;

        info!(
            "Settled quote for {}: {}e{} published at {}",
            feed_id, quote.price, quote.expo, quote.publish_time
        );
        Ok(quote)
    }

    /// [`OracleUpdater::read_settled_quote`] with the configured age bound
    pub async fn read_latest(
        &self,
        feed_id: &FeedId,
        connection: &dyn SigningConnection,
    ) -> AppResult<PriceQuote> {
        self.read_settled_quote(feed_id, connection, self.max_age_secs)
            .await
    }
}
