use crate::error::{AppError, AppResult};
use crate::models::{FeedId, PriceQuote};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const LATEST_UPDATES_PATH: &str = "/v2/updates/price/latest";

/// Off-chain source of display quotes and signed update payloads
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest quote for display only, no chain interaction
    async fn fetch_display_quote(&self, feed_id: &FeedId) -> AppResult<PriceQuote>;

    /// Signed update blobs, ready to pass to `updatePriceFeeds`
    async fn fetch_update_payload(&self, feed_id: &FeedId) -> AppResult<Vec<Vec<u8>>>;
}

#[derive(Debug, Deserialize)]
struct LatestUpdatesResponse {
    binary: Option<BinaryUpdate>,
    parsed: Option<Vec<ParsedUpdate>>,
}

#[derive(Debug, Deserialize)]
struct BinaryUpdate {
    data: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    price: Option<RawPrice>,
}

/// Mantissa and confidence arrive as decimal strings
#[derive(Debug, Deserialize)]
struct RawPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

fn parse_body(body: &str) -> AppResult<LatestUpdatesResponse> {
    serde_json::from_str(body)
        .map_err(|e| AppError::UpstreamUnavailable(format!("malformed price service response: {}", e)))
}

/// Extract the first parsed quote from a latest-updates response body
pub fn parse_display_quote(body: &str, feed_id: &FeedId) -> AppResult<PriceQuote> {
    let response = parse_body(body)?;

    let first = response
        .parsed
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| AppError::FeedDataMissing(feed_id.to_string()))?;

    let raw = first
        .price
        .ok_or_else(|| AppError::UpstreamUnavailable("price missing from response".to_string()))?;

    let price = raw
        .price
        .parse::<i64>()
        .map_err(|e| AppError::UpstreamUnavailable(format!("invalid price {}: {}", raw.price, e)))?;
    let conf = raw
        .conf
        .parse::<u64>()
        .map_err(|e| AppError::UpstreamUnavailable(format!("invalid conf {}: {}", raw.conf, e)))?;

    Ok(PriceQuote {
        price,
        conf,
        expo: raw.expo,
        publish_time: raw.publish_time,
    })
}

/// Decode the hex update blobs from a latest-updates response body
pub fn parse_update_payload(body: &str, feed_id: &FeedId) -> AppResult<Vec<Vec<u8>>> {
    let response = parse_body(body)?;

    let data = response
        .binary
        .and_then(|binary| binary.data)
        .ok_or_else(|| AppError::UpstreamUnavailable("update data missing from response".to_string()))?;

    if data.is_empty() {
        return Err(AppError::FeedDataMissing(feed_id.to_string()));
    }

    data.iter()
        .map(|blob| {
            alloy_primitives::hex::decode(blob)
                .map_err(|e| AppError::UpstreamUnavailable(format!("invalid update blob: {}", e)))
        })
        .collect()
}

/// Hermes price service client
pub struct HermesClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HermesClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_latest(&self, feed_id: &FeedId, hex_encoding: bool) -> AppResult<String> {
        let id = feed_id.to_string();
        let mut query = vec![("ids[]", id.as_str())];
        if hex_encoding {
            query.push(("encoding", "hex"));
        }

        let response = self
            .client
            .get(format!("{}{}", self.base_url, LATEST_UPDATES_PATH))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("price service request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "price service returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("price service read failed: {}", e)))
    }
}

#[async_trait]
impl PriceSource for HermesClient {
    async fn fetch_display_quote(&self, feed_id: &FeedId) -> AppResult<PriceQuote> {
        debug!("Fetching display quote for {}", feed_id);
        let body = self.get_latest(feed_id, false).await?;
        parse_display_quote(&body, feed_id)
    }

    async fn fetch_update_payload(&self, feed_id: &FeedId) -> AppResult<Vec<Vec<u8>>> {
        let body = self.get_latest(feed_id, true).await?;
        let payload = parse_update_payload(&body, feed_id)?;
        info!("Fetched {} update blob(s) for {}", payload.len(), feed_id);
        Ok(payload)
    }
}
