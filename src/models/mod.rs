//! Domain models for the dashboard.
//!
//! Price feeds and quotes, chat transcript entries, randomness requests, and
//! the notifications surfaced to the user.

pub mod chat;
pub mod notification;
pub mod price_feed;
pub mod quote;
pub mod randomness;

// Re-export all models for convenient access
pub use chat::{ChatMessage, ChatRole};
pub use notification::{Notification, NotificationLevel};
pub use price_feed::{find_by_symbol, find_feed, FeedId, PriceFeedDescriptor, DEFAULT_FEED, PRICE_FEEDS};
pub use quote::{
    format_price, to_display_value, PriceHistory, PriceHistoryPoint, PriceQuote,
    PRICE_HISTORY_CAPACITY,
};
pub use randomness::{
    generate_commitment, scale_to_range, RandomnessRequest, RandomnessResult, RequestStatus,
};

/// Integers as JSON strings, so browser clients keep full precision
pub(crate) mod as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<T>().map_err(de::Error::custom)
    }
}

/// `[u8; 32]` as a `0x`-prefixed hex string
pub(crate) mod hex32 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out).map_err(de::Error::custom)?;
        Ok(out)
    }
}
