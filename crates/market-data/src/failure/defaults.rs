//! Deterministic placeholder data.
//!
//! Used only when no provider answered and nothing usable is cached. All
//! values are flagged `is_default` and carry a warning.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::models::{
    CachePayload, CurrencyPair, ExchangeRate, HistoricalSeries, PricePoint, Quote, Request,
    Timeframe,
};

pub const DEFAULT_SOURCE: &str = "DEFAULT";

const BROAD_ETFS: &[&str] = &["VWCE", "VTI", "SPY", "QQQ"];
const INDEX_MARKERS: &[&str] = &["OMX", "SPX"];

const DEFAULT_RATES: &[(&str, &str, Decimal)] = &[
    ("EUR", "USD", Decimal::from_parts(109, 0, 0, false, 2)),
    ("EUR", "GBP", Decimal::from_parts(84, 0, 0, false, 2)),
    ("EUR", "SEK", Decimal::from_parts(1150, 0, 0, false, 2)),
    ("USD", "EUR", Decimal::from_parts(92, 0, 0, false, 2)),
    ("GBP", "EUR", Decimal::from_parts(119, 0, 0, false, 2)),
    ("SEK", "EUR", Decimal::from_parts(87, 0, 0, false, 3)),
];

/// Placeholder price level for a symbol.
pub fn base_price(symbol: &str) -> Decimal {
    let symbol = symbol.to_uppercase();
    if BROAD_ETFS.iter().any(|etf| symbol.contains(etf)) {
        Decimal::from(80)
    } else if INDEX_MARKERS.iter().any(|marker| symbol.contains(marker)) {
        Decimal::from(2500)
    } else {
        Decimal::ONE_HUNDRED
    }
}

pub fn default_quote(symbol: &str, now: DateTime<Utc>) -> Quote {
    let mut quote = Quote::new(symbol, base_price(symbol), DEFAULT_SOURCE, now);
    quote.warning = Some(format!(
        "Live price for {} is unavailable; showing a placeholder value",
        symbol
    ));
    quote.is_default = true;
    quote
}

/// Flat daily series ending today.
pub fn default_series(symbol: &str, timeframe: Timeframe, now: DateTime<Utc>) -> HistoricalSeries {
    let price = base_price(symbol);
    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now);
    let periods = timeframe.default_periods();

    let prices = (0..periods)
        .map(|i| {
            let days_back = (periods - 1 - i) as i64;
            PricePoint::flat(today - Duration::days(days_back), price)
        })
        .collect();

    let mut series =
        HistoricalSeries::normalize(symbol, timeframe, prices, periods, DEFAULT_SOURCE);
    series.warning = Some(format!(
        "Historical data for {} is unavailable; showing a flat placeholder series",
        symbol
    ));
    series.is_default = true;
    series
}

/// Rate from the fixed table, inverting the reverse pair when only that is known.
pub fn default_rate_value(pair: &CurrencyPair) -> Decimal {
    if pair.is_identity() {
        return Decimal::ONE;
    }
    let lookup = |from: &str, to: &str| {
        DEFAULT_RATES
            .iter()
            .find(|(f, t, _)| *f == from && *t == to)
            .map(|(_, _, rate)| *rate)
    };

    if let Some(rate) = lookup(&pair.from, &pair.to) {
        return rate;
    }
    match lookup(&pair.to, &pair.from) {
        Some(reverse) if !reverse.is_zero() => (Decimal::ONE / reverse).round_dp(6),
        _ => Decimal::ONE,
    }
}

pub fn default_rate(pair: &CurrencyPair, now: DateTime<Utc>) -> ExchangeRate {
    let mut rate = ExchangeRate::new(pair.clone(), default_rate_value(pair), DEFAULT_SOURCE, now);
    rate.warning = Some(format!(
        "Exchange rate {} is unavailable; using a fixed reference rate",
        pair
    ));
    rate.is_default = true;
    rate
}

/// Placeholder shaped for `request`.
pub fn default_payload(request: &Request, now: DateTime<Utc>) -> CachePayload {
    match request {
        Request::Quote { symbol } => default_quote(symbol, now).into(),
        Request::Historical { symbol, timeframe } => {
            default_series(symbol, *timeframe, now).into()
        }
        Request::ExchangeRate { pair } => default_rate(pair, now).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_base_prices() {
        assert_eq!(base_price("VWCE.DE"), dec!(80));
        assert_eq!(base_price("spy"), dec!(80));
        assert_eq!(base_price("OMXH25"), dec!(2500));
        assert_eq!(base_price("^SPX"), dec!(2500));
        assert_eq!(base_price("AAPL"), dec!(100));
    }

    #[test]
    fn test_default_quote_is_flagged_and_deterministic() {
        let a = default_quote("AAPL", now());
        let b = default_quote("AAPL", now());
        assert_eq!(a, b);
        assert!(a.is_default);
        assert_eq!(a.source, "DEFAULT");
        assert!(!a.warning.as_deref().unwrap_or_default().is_empty());
        assert_eq!(a.change, Decimal::ZERO);
    }

    #[test]
    fn test_default_series_shape() {
        let series = default_series("AAPL", Timeframe::OneMonth, now());
        assert_eq!(series.prices.len(), 30);
        assert!(series.is_strictly_ascending());
        assert_eq!(
            series.prices.last().map(|p| p.date.date_naive()),
            Some(now().date_naive())
        );
        assert!(series.is_default);

        assert_eq!(default_series("AAPL", Timeframe::OneDay, now()).prices.len(), 1);
    }

    #[test]
    fn test_default_rates() {
        assert_eq!(default_rate_value(&CurrencyPair::new("EUR", "USD")), dec!(1.09));
        assert_eq!(default_rate_value(&CurrencyPair::new("SEK", "EUR")), dec!(0.087));
        // Only EUR/GBP and GBP/EUR are tabled; USD/GBP is not
        assert_eq!(default_rate_value(&CurrencyPair::new("USD", "GBP")), Decimal::ONE);
        assert_eq!(default_rate_value(&CurrencyPair::new("USD", "USD")), Decimal::ONE);
        assert_eq!(
            default_rate_value(&CurrencyPair::new("SEK", "USD")),
            Decimal::ONE
        );

        let rate = default_rate(&CurrencyPair::new("EUR", "SEK"), now());
        assert!(rate.is_default);
        assert_eq!(rate.rate, dec!(11.50));
    }
}
