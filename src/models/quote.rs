use crate::error::{AppError, AppResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of points kept for the price chart
pub const PRICE_HISTORY_CAPACITY: usize = 20;

/// Fixed-point quote: value = price × 10^expo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    #[serde(with = "crate::models::as_string")]
    pub price: i64,
    #[serde(with = "crate::models::as_string")]
    pub conf: u64,
    pub expo: i32,
    /// Unix seconds
    pub publish_time: i64,
}

impl PriceQuote {
    pub fn display_value(&self) -> AppResult<Decimal> {
        to_display_value(self.price, self.expo)
    }

    /// Confidence interval on the same scale as the price
    pub fn display_confidence(&self) -> AppResult<Decimal> {
        let conf = i64::try_from(self.conf)
            .map_err(|_| AppError::Validation(format!("confidence {} out of range", self.conf)))?;
        to_display_value(conf, self.expo)
    }
}

/// `mantissa × 10^exponent`, exact for exponents in [-28, 0]
pub fn to_display_value(mantissa: i64, exponent: i32) -> AppResult<Decimal> {
    if exponent <= 0 {
        let scale = exponent.unsigned_abs();
        if scale > 28 {
            return Err(AppError::Validation(format!(
                "exponent {} exceeds decimal precision",
                exponent
            )));
        }
        return Ok(Decimal::new(mantissa, scale));
    }

    let mut value = Decimal::from(mantissa);
    if value.is_zero() {
        return Ok(value);
    }
    for _ in 0..exponent {
        value = value.checked_mul(Decimal::TEN).ok_or_else(|| {
            AppError::Validation(format!("{}e{} overflows", mantissa, exponent))
        })?;
    }
    Ok(value)
}

/// Fixed-decimal rendering, e.g. `1234.50`
pub fn format_price(value: Decimal, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, value.round_dp(decimals))
}

/// One chart sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    /// Unix seconds
    pub timestamp: i64,
    pub value: f64,
}

impl PriceHistoryPoint {
    pub fn from_quote(quote: &PriceQuote) -> AppResult<Self> {
        let value = quote
            .display_value()?
            .to_f64()
            .ok_or_else(|| AppError::Validation("price not representable as f64".to_string()))?;
        Ok(Self {
            timestamp: quote.publish_time,
            value,
        })
    }
}

/// Bounded FIFO of chart samples; the oldest point is evicted first
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    points: VecDeque<PriceHistoryPoint>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self {
            points: VecDeque::with_capacity(PRICE_HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, point: PriceHistoryPoint) {
        if self.points.len() == PRICE_HISTORY_CAPACITY {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceHistoryPoint> {
        self.points.back()
    }

    pub fn to_vec(&self) -> Vec<PriceHistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_value_exact() {
        assert_eq!(to_display_value(12345, -2).unwrap(), Decimal::new(12345, 2));
        assert_eq!(to_display_value(12345, -2).unwrap().to_string(), "123.45");
        assert_eq!(to_display_value(-5, 0).unwrap(), Decimal::from(-5));
        assert_eq!(to_display_value(7, 3).unwrap(), Decimal::from(7000));
    }

    #[test]
    fn test_display_value_matches_float_within_tolerance() {
        for exponent in -12..=0 {
            for mantissa in [0i64, 1, -1, 42, 6_543_210, -987_654_321, 1_000_000_007] {
                let exact = to_display_value(mantissa, exponent).unwrap().to_f64().unwrap();
                let approx = mantissa as f64 * 10f64.powi(exponent);
                let tolerance = approx.abs() * 1e-12 + 1e-18;
                assert!(
                    (exact - approx).abs() <= tolerance,
                    "{} x 10^{}: {} vs {}",
                    mantissa,
                    exponent,
                    exact,
                    approx
                );
            }
        }
    }

    #[test]
    fn test_display_value_rejects_out_of_range() {
        assert!(to_display_value(1, -29).is_err());
        assert!(to_display_value(i64::MAX, 20).is_err());
        assert_eq!(to_display_value(0, i32::MAX).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_format_price() {
        let value = to_display_value(123_450, -2).unwrap();
        assert_eq!(format_price(value, 2), "1234.50");
        assert_eq!(format_price(Decimal::new(1, 0), 2), "1.00");
    }

    #[test]
    fn test_quote_serializes_mantissa_as_string() {
        let quote = PriceQuote {
            price: 123_450,
            conf: 10,
            expo: -2,
            publish_time: 1_700_000_000,
        };
        let json = serde_json::to_value(quote).unwrap();
        assert_eq!(json["price"], "123450");
        assert_eq!(json["conf"], "10");
        assert_eq!(json["expo"], -2);
        assert_eq!(json["publishTime"], 1_700_000_000);

        let back: PriceQuote = serde_json::from_value(json).unwrap();
        assert_eq!(back, quote);
    }

    #[test]
    fn test_history_keeps_last_twenty_in_order() {
        let mut history = PriceHistory::new();
        for i in 0..25 {
            history.push(PriceHistoryPoint {
                timestamp: i,
                value: i as f64,
            });
        }

        assert_eq!(history.len(), PRICE_HISTORY_CAPACITY);
        let timestamps: Vec<i64> = history.to_vec().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, (5..25).collect::<Vec<_>>());
        assert_eq!(history.latest().unwrap().timestamp, 24);
    }
}
