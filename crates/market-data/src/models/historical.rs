use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::Symbol;
use crate::errors::MarketDataError;

/// Supported history windows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneDay,
        Timeframe::OneWeek,
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::OneYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneDay => "1D",
            Timeframe::OneWeek => "1W",
            Timeframe::OneMonth => "1M",
            Timeframe::ThreeMonths => "3M",
            Timeframe::OneYear => "1Y",
        }
    }

    /// Upper bound on returned points. 1D is a session of 5-minute bars.
    pub fn max_points(self) -> usize {
        match self {
            Timeframe::OneDay => 78,
            Timeframe::OneWeek => 7,
            Timeframe::OneMonth => 30,
            Timeframe::ThreeMonths => 90,
            Timeframe::OneYear => 365,
        }
    }

    /// Number of daily points in a synthetic series.
    pub fn default_periods(self) -> usize {
        match self {
            Timeframe::OneDay => 1,
            Timeframe::OneWeek => 7,
            Timeframe::OneMonth => 30,
            Timeframe::ThreeMonths => 90,
            Timeframe::OneYear => 365,
        }
    }

    /// How far back the window reaches from now.
    pub fn lookback(self) -> chrono::Duration {
        chrono::Duration::days(self.default_periods() as i64)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(Timeframe::OneDay),
            "1W" => Ok(Timeframe::OneWeek),
            "1M" => Ok(Timeframe::OneMonth),
            "3M" => Ok(Timeframe::ThreeMonths),
            "1Y" => Ok(Timeframe::OneYear),
            other => Err(MarketDataError::ValidationFailed {
                message: format!("Unsupported timeframe: {}", other),
            }),
        }
    }
}

/// One OHLCV bar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl PricePoint {
    /// A bar where every price equals `price`.
    pub fn flat(date: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
        }
    }
}

/// Price history for a symbol, always in ascending date order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSeries {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub prices: Vec<PricePoint>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl HistoricalSeries {
    /// Build a series from points in any order.
    ///
    /// Points are sorted ascending, duplicate instants collapse to one, and
    /// only the most recent `cap` points are kept.
    pub fn normalize(
        symbol: impl Into<Symbol>,
        timeframe: Timeframe,
        mut prices: Vec<PricePoint>,
        cap: usize,
        source: impl Into<String>,
    ) -> Self {
        prices.sort_by(|a, b| a.date.cmp(&b.date));
        prices.dedup_by(|later, earlier| later.date == earlier.date);
        if prices.len() > cap {
            let excess = prices.len() - cap;
            prices.drain(..excess);
        }

        Self {
            symbol: symbol.into(),
            timeframe,
            prices,
            source: source.into(),
            warning: None,
            is_default: false,
        }
    }

    pub fn is_strictly_ascending(&self) -> bool {
        self.prices.windows(2).all(|pair| pair[0].date < pair[1].date)
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.prices.last().map(|p| p.close)
    }
}
