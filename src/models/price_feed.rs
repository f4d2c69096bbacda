use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte price feed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId([u8; 32]);

impl FeedId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// On-chain `bytes32` form
    pub fn to_bytes32(&self) -> [u8; 32] {
        self.0
    }
}

impl FromStr for FeedId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if trimmed.len() != 64 {
            return Err(format!("feed id must be 64 hex characters, got {}", trimmed.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| format!("invalid feed id {}: {}", s, e))?;
        Ok(Self(bytes))
    }
}

/// Lowercase hex without prefix, the price service's format
impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for FeedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FeedId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Known feed and its display metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceFeedDescriptor {
    pub id: &'static str,
    pub symbol: &'static str,
    pub name: &'static str,
}

impl PriceFeedDescriptor {
    pub fn feed_id(&self) -> Result<FeedId, String> {
        FeedId::from_str(self.id)
    }
}

pub const PRICE_FEEDS: [PriceFeedDescriptor; 5] = [
    PriceFeedDescriptor {
        id: "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
        symbol: "BTC/USD",
        name: "Bitcoin",
    },
    PriceFeedDescriptor {
        id: "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
        symbol: "ETH/USD",
        name: "Ethereum",
    },
    PriceFeedDescriptor {
        id: "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a",
        symbol: "USDC/USD",
        name: "USD Coin",
    },
    PriceFeedDescriptor {
        id: "03ae4db29ed4ae33d323568895aa00337e658e348b37509f5372ae51f0af00d5",
        symbol: "SOL/USD",
        name: "Solana",
    },
    PriceFeedDescriptor {
        id: "49f6b65cb1de6b10eaf75e7c03ca029c306d0357e91b5311b175084a5ad55688",
        symbol: "AAPL/USD",
        name: "Apple Inc",
    },
];

/// BTC/USD
pub const DEFAULT_FEED: PriceFeedDescriptor = PRICE_FEEDS[0];

pub fn find_feed(id: &FeedId) -> Option<&'static PriceFeedDescriptor> {
    PRICE_FEEDS
        .iter()
        .find(|feed| feed.feed_id().map(|f| f == *id).unwrap_or(false))
}

pub fn find_by_symbol(symbol: &str) -> Option<&'static PriceFeedDescriptor> {
    PRICE_FEEDS
        .iter()
        .find(|feed| feed.symbol.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_parse() {
        for feed in PRICE_FEEDS.iter() {
            let id = feed.feed_id().unwrap();
            assert_eq!(id.to_string(), feed.id);
        }
    }

    #[test]
    fn test_feed_id_accepts_prefix() {
        let plain: FeedId = DEFAULT_FEED.id.parse().unwrap();
        let prefixed: FeedId = format!("0x{}", DEFAULT_FEED.id).parse().unwrap();
        assert_eq!(plain, prefixed);
        assert!("abcd".parse::<FeedId>().is_err());
    }

    #[test]
    fn test_lookup() {
        let eth = find_by_symbol("eth/usd").unwrap();
        assert_eq!(eth.name, "Ethereum");

        let id = eth.feed_id().unwrap();
        assert_eq!(find_feed(&id).unwrap().symbol, "ETH/USD");
    }
}
