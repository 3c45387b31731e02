use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::Symbol;

/// Normalized current trading snapshot for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: Symbol,

    /// Current price (always positive for provider data)
    pub price: Decimal,

    /// Absolute change against the previous close
    pub change: Decimal,

    /// Percentage change against the previous close (1.5 means 1.5%)
    pub change_percent: Decimal,

    pub volume: u64,
    pub high: Decimal,
    pub low: Decimal,
    pub timestamp: DateTime<Utc>,

    /// Where the quote came from (YAHOO, CACHE_FALLBACK, DEFAULT, ...)
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_name: Option<String>,

    /// Provider's own notion of the last trade (free-form, provider dependent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_time: Option<String>,

    /// Set whenever the quote is degraded (cached fallback or synthetic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// True only for synthetic placeholder data
    #[serde(default)]
    pub is_default: bool,
}

impl Quote {
    /// Create a quote with flat change and the price as the day range.
    pub fn new(
        symbol: impl Into<Symbol>,
        price: Decimal,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change: Decimal::ZERO,
            change_percent: Decimal::ZERO,
            volume: 0,
            high: price,
            low: price,
            timestamp,
            source: source.into(),
            open: None,
            previous_close: None,
            market_cap: None,
            pe_ratio: None,
            currency: None,
            exchange_name: None,
            last_trade_time: None,
            warning: None,
            is_default: false,
        }
    }

    /// Set change and derive the percentage from the implied previous close.
    pub fn with_change(mut self, change: Decimal) -> Self {
        self.change = change;
        let previous = self.price - change;
        self.change_percent = if previous.is_zero() {
            Decimal::ZERO
        } else {
            (change / previous * Decimal::ONE_HUNDRED).round_dp(4)
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_with_change_derives_percent() {
        let quote = Quote::new("AAPL", dec!(110), "TEST", Utc::now()).with_change(dec!(10));
        assert_eq!(quote.change, dec!(10));
        assert_eq!(quote.change_percent, dec!(10));
    }

    #[test]
    fn test_serializes_camel_case() {
        let quote = Quote::new("AAPL", dec!(150.25), "TEST", Utc::now());
        let json = serde_json::to_value(&quote).unwrap();
        assert!(json.get("changePercent").is_some());
        assert!(json.get("isDefault").is_some());
        assert!(json.get("previousClose").is_none());
    }
}
