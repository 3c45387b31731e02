use serde::{Deserialize, Serialize};

use super::fx::ExchangeRate;
use super::historical::HistoricalSeries;
use super::quote::Quote;
use super::request::Request;

/// Anything the cache can hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum CachePayload {
    Quote(Quote),
    Historical(HistoricalSeries),
    ExchangeRate(ExchangeRate),
}

impl CachePayload {
    /// Whether this payload is the right shape to answer `request`.
    pub fn matches(&self, request: &Request) -> bool {
        matches!(
            (self, request),
            (CachePayload::Quote(_), Request::Quote { .. })
                | (CachePayload::Historical(_), Request::Historical { .. })
                | (CachePayload::ExchangeRate(_), Request::ExchangeRate { .. })
        )
    }

    pub fn source(&self) -> &str {
        match self {
            CachePayload::Quote(q) => &q.source,
            CachePayload::Historical(h) => &h.source,
            CachePayload::ExchangeRate(r) => &r.source,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            CachePayload::Quote(q) => q.warning.as_deref(),
            CachePayload::Historical(h) => h.warning.as_deref(),
            CachePayload::ExchangeRate(r) => r.warning.as_deref(),
        }
    }

    pub fn is_default(&self) -> bool {
        match self {
            CachePayload::Quote(q) => q.is_default,
            CachePayload::Historical(h) => h.is_default,
            CachePayload::ExchangeRate(r) => r.is_default,
        }
    }

    /// Re-label as degraded data.
    pub fn degrade(mut self, source: &str, warning: String, is_default: bool) -> Self {
        match &mut self {
            CachePayload::Quote(q) => {
                q.source = source.to_string();
                q.warning = Some(warning);
                q.is_default = is_default;
            }
            CachePayload::Historical(h) => {
                h.source = source.to_string();
                h.warning = Some(warning);
                h.is_default = is_default;
            }
            CachePayload::ExchangeRate(r) => {
                r.source = source.to_string();
                r.warning = Some(warning);
                r.is_default = is_default;
            }
        }
        self
    }
}

impl From<Quote> for CachePayload {
    fn from(quote: Quote) -> Self {
        CachePayload::Quote(quote)
    }
}

impl From<HistoricalSeries> for CachePayload {
    fn from(series: HistoricalSeries) -> Self {
        CachePayload::Historical(series)
    }
}

impl From<ExchangeRate> for CachePayload {
    fn from(rate: ExchangeRate) -> Self {
        CachePayload::ExchangeRate(rate)
    }
}

// The error hands the payload back untouched.
impl TryFrom<CachePayload> for Quote {
    type Error = CachePayload;

    fn try_from(payload: CachePayload) -> Result<Self, Self::Error> {
        match payload {
            CachePayload::Quote(quote) => Ok(quote),
            other => Err(other),
        }
    }
}

impl TryFrom<CachePayload> for HistoricalSeries {
    type Error = CachePayload;

    fn try_from(payload: CachePayload) -> Result<Self, Self::Error> {
        match payload {
            CachePayload::Historical(series) => Ok(series),
            other => Err(other),
        }
    }
}

impl TryFrom<CachePayload> for ExchangeRate {
    type Error = CachePayload;

    fn try_from(payload: CachePayload) -> Result<Self, Self::Error> {
        match payload {
            CachePayload::ExchangeRate(rate) => Ok(rate),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurrencyPair;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_degrade_relabels_and_keeps_data() {
        let payload: CachePayload = Quote::new("AAPL", dec!(150.25), "YAHOO", Utc::now()).into();
        let request = Request::Quote {
            symbol: "AAPL".to_string(),
        };
        assert!(payload.matches(&request));

        let degraded = payload.degrade("CACHE_FALLBACK", "stale".to_string(), false);
        assert_eq!(degraded.source(), "CACHE_FALLBACK");
        assert_eq!(degraded.warning(), Some("stale"));
        assert!(!degraded.is_default());

        let quote = Quote::try_from(degraded).unwrap();
        assert_eq!(quote.price, dec!(150.25));
    }

    #[test]
    fn test_try_from_wrong_variant_returns_payload() {
        let rate = ExchangeRate::new(CurrencyPair::new("EUR", "USD"), dec!(1.09), "T", Utc::now());
        let payload = CachePayload::from(rate);
        let back = Quote::try_from(payload.clone()).unwrap_err();
        assert_eq!(back, payload);
    }
}
