//! Coarse market-open heuristic.
//!
//! Weekday and hour-of-day at a fixed UTC offset. No holidays, no DST, no
//! half days: it only decides which realtime TTL to use.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::MarketHoursConfig;

/// Snapshot returned by the service's `market_status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatus {
    pub is_open: bool,
    /// Local time at the configured offset
    pub local_time: DateTime<FixedOffset>,
}

pub fn local_time(config: &MarketHoursConfig, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset)
}

/// Monday to Friday with the local hour in `[open_hour, close_hour]`.
pub fn is_market_open(config: &MarketHoursConfig, now: DateTime<Utc>) -> bool {
    let local = local_time(config, now);
    let weekday = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
    weekday && (config.open_hour..=config.close_hour).contains(&local.hour())
}

pub fn market_status(config: &MarketHoursConfig, now: DateTime<Utc>) -> MarketStatus {
    MarketStatus {
        is_open: is_market_open(config, now),
        local_time: local_time(config, now),
    }
}
