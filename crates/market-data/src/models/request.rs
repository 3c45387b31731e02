use serde::{Deserialize, Serialize};

use super::fx::CurrencyPair;
use super::historical::Timeframe;
use super::types::Symbol;

/// Cache-duration class of a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataCategory {
    Realtime,
    Historical,
    Currency,
}

/// A single lookup the service can resolve.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Request {
    Quote { symbol: Symbol },
    Historical { symbol: Symbol, timeframe: Timeframe },
    ExchangeRate { pair: CurrencyPair },
}

impl Request {
    /// Cache key: `price_{SYMBOL}`, `historical_{SYMBOL}_{TF}` or `exchange_{FROM}_{TO}`.
    pub fn cache_key(&self) -> String {
        match self {
            Request::Quote { symbol } => format!("price_{}", symbol),
            Request::Historical { symbol, timeframe } => {
                format!("historical_{}_{}", symbol, timeframe)
            }
            Request::ExchangeRate { pair } => format!("exchange_{}_{}", pair.from, pair.to),
        }
    }

    pub fn category(&self) -> DataCategory {
        match self {
            Request::Quote { .. } => DataCategory::Realtime,
            Request::Historical { .. } => DataCategory::Historical,
            Request::ExchangeRate { .. } => DataCategory::Currency,
        }
    }

    /// What the caller asked about: a symbol, or "FROM/TO" for rates.
    pub fn subject(&self) -> String {
        match self {
            Request::Quote { symbol } | Request::Historical { symbol, .. } => symbol.clone(),
            Request::ExchangeRate { pair } => pair.to_string(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Request::Quote { .. } => "quote",
            Request::Historical { .. } => "historical",
            Request::ExchangeRate { .. } => "exchange_rate",
        }
    }

    pub fn timeframe(&self) -> Option<Timeframe> {
        match self {
            Request::Historical { timeframe, .. } => Some(*timeframe),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys() {
        let quote = Request::Quote {
            symbol: "AAPL".to_string(),
        };
        assert_eq!(quote.cache_key(), "price_AAPL");

        let historical = Request::Historical {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::OneMonth,
        };
        assert_eq!(historical.cache_key(), "historical_AAPL_1M");
        assert_eq!(historical.category(), DataCategory::Historical);

        let fx = Request::ExchangeRate {
            pair: CurrencyPair::new("eur", "usd"),
        };
        assert_eq!(fx.cache_key(), "exchange_EUR_USD");
        assert_eq!(fx.subject(), "EUR/USD");
    }
}
