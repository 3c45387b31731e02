use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::Currency;

/// An ordered currency pair, codes upper-cased.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: Currency,
    pub to: Currency,
}

impl CurrencyPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.trim().to_uppercase(),
            to: to.trim().to_uppercase(),
        }
    }

    /// Same currency on both sides.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Concatenated form used by most providers ("EURUSD").
    pub fn joined(&self) -> String {
        format!("{}{}", self.from, self.to)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Conversion rate for one unit of `pair.from` in `pair.to`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl ExchangeRate {
    pub fn new(
        pair: CurrencyPair,
        rate: Decimal,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            pair,
            rate,
            timestamp,
            source: source.into(),
            warning: None,
            is_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_normalizes_case() {
        let pair = CurrencyPair::new(" eur", "usd ");
        assert_eq!(pair.from, "EUR");
        assert_eq!(pair.to, "USD");
        assert_eq!(pair.joined(), "EURUSD");
        assert_eq!(pair.to_string(), "EUR/USD");
        assert_eq!(pair.inverse(), CurrencyPair::new("USD", "EUR"));
    }

    #[test]
    fn test_identity() {
        assert!(CurrencyPair::new("sek", "SEK").is_identity());
        assert!(!CurrencyPair::new("SEK", "EUR").is_identity());
    }
}
