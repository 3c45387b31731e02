//! IEX Cloud market data provider.
//!
//! Quotes, chart history, FX and batched quotes from the IEX Cloud REST API.
//! Every call carries the publishable token as a `token` query parameter.
//! The sandbox environment serves scrambled data and is meant for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{CurrencyPair, ExchangeRate, HistoricalSeries, PricePoint, Quote, Timeframe};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderCapabilities, ProviderStats};

const BASE_URL: &str = "https://cloud.iexapis.com/stable";
const SANDBOX_URL: &str = "https://sandbox.iexapis.com/stable";
const PROVIDER_ID: &str = "IEX_CLOUD";
const ERROR_THRESHOLD: u64 = 5;

/// Upper bound on symbols per batch call.
const MAX_BATCH_SYMBOLS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IexQuote {
    latest_price: Option<f64>,
    iex_realtime_price: Option<f64>,
    delayed_price: Option<f64>,
    change: Option<f64>,
    /// Fraction, 0.01 means 1%
    change_percent: Option<f64>,
    latest_volume: Option<u64>,
    avg_total_volume: Option<u64>,
    high: Option<f64>,
    low: Option<f64>,
    open: Option<f64>,
    previous_close: Option<f64>,
    market_cap: Option<f64>,
    pe_ratio: Option<f64>,
    latest_time: Option<String>,
    /// Unix milliseconds
    latest_update: Option<i64>,
    currency: Option<String>,
    primary_exchange: Option<String>,
}

impl IexQuote {
    fn price(&self) -> Option<f64> {
        // Zero means "no print yet" rather than a real price
        [self.latest_price, self.iex_realtime_price, self.delayed_price]
            .into_iter()
            .flatten()
            .find(|p| *p > 0.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IexChartPoint {
    date: String,
    /// Present on intraday points only, "HH:MM"
    minute: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    average: Option<f64>,
    market_average: Option<f64>,
    volume: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IexFxRate {
    rate: Option<f64>,
    /// Unix milliseconds
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IexBatchEntry {
    quote: Option<IexQuote>,
}

/// IEX Cloud market data provider.
pub struct IexCloudProvider {
    client: Client,
    token: Option<String>,
    base_url: String,
    stats: ProviderStats,
}

impl IexCloudProvider {
    /// Create the adapter. `None` leaves it unconfigured.
    pub fn new(token: Option<String>, sandbox: bool) -> Self {
        Self {
            client: http::build_client(),
            token: token.filter(|t| !t.trim().is_empty()),
            base_url: if sandbox { SANDBOX_URL } else { BASE_URL }.to_string(),
            stats: ProviderStats::new(ERROR_THRESHOLD),
        }
    }

    /// Point the adapter at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        subject: &str,
    ) -> Result<T, MarketDataError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| MarketDataError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            })?;

        let mut all_params = params.to_vec();
        all_params.push(("token", token));
        let url = http::build_url(
            PROVIDER_ID,
            &format!("{}/{}", self.base_url, endpoint),
            &all_params,
        )?;
        http::get_json(&self.client, PROVIDER_ID, url, subject, Some(token)).await
    }

    fn chart_endpoint(symbol: &str, timeframe: Timeframe) -> String {
        let symbol = encode(symbol);
        match timeframe {
            Timeframe::OneDay => format!("stock/{}/intraday-prices", symbol),
            Timeframe::OneWeek => format!("stock/{}/chart/5d", symbol),
            Timeframe::OneMonth => format!("stock/{}/chart/1m", symbol),
            Timeframe::ThreeMonths => format!("stock/{}/chart/3m", symbol),
            Timeframe::OneYear => format!("stock/{}/chart/1y", symbol),
        }
    }

    fn to_quote(symbol: &str, raw: IexQuote) -> Result<Quote, MarketDataError> {
        let price = raw.price().and_then(http::decimal_from_f64).ok_or_else(|| {
            MarketDataError::MalformedResponse {
                provider: PROVIDER_ID.to_string(),
                message: format!("no price for {}", symbol),
            }
        })?;
        let decimal = |value: Option<f64>| value.and_then(http::decimal_from_f64);

        let timestamp = raw
            .latest_update
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(symbol, price, PROVIDER_ID, timestamp);
        quote.change = decimal(raw.change).unwrap_or(Decimal::ZERO);
        quote.change_percent = decimal(raw.change_percent)
            .map(|fraction| (fraction * Decimal::ONE_HUNDRED).round_dp(4))
            .unwrap_or(Decimal::ZERO);
        quote.volume = raw.latest_volume.or(raw.avg_total_volume).unwrap_or(0);
        quote.high = decimal(raw.high).unwrap_or(price);
        quote.low = decimal(raw.low).unwrap_or(price);
        quote.open = decimal(raw.open);
        quote.previous_close = decimal(raw.previous_close);
        quote.market_cap = decimal(raw.market_cap);
        quote.pe_ratio = decimal(raw.pe_ratio);
        quote.currency = raw.currency;
        quote.exchange_name = raw.primary_exchange;
        quote.last_trade_time = raw.latest_time;
        Ok(quote)
    }

    fn to_price_point(point: IexChartPoint) -> Option<PricePoint> {
        let date = NaiveDate::parse_from_str(&point.date, "%Y-%m-%d").ok()?;
        let time = point
            .minute
            .as_deref()
            .and_then(|m| NaiveTime::parse_from_str(m, "%H:%M").ok())
            .or_else(|| NaiveTime::from_hms_opt(0, 0, 0))?;
        let close = point
            .close
            .or(point.average)
            .or(point.market_average)
            .and_then(http::decimal_from_f64)?;
        let or_close = |value: Option<f64>| value.and_then(http::decimal_from_f64).unwrap_or(close);

        Some(PricePoint {
            date: Utc.from_utc_datetime(&NaiveDateTime::new(date, time)),
            open: or_close(point.open),
            high: or_close(point.high),
            low: or_close(point.low),
            close,
            volume: point.volume.unwrap_or(0),
        })
    }
}

#[async_trait]
impl MarketDataProvider for IexCloudProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &'static str {
        "IEX Cloud"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::ALL
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let endpoint = format!("stock/{}/quote", encode(symbol));
        let raw: IexQuote = self.fetch(&endpoint, &[], symbol).await?;
        Self::to_quote(symbol, raw)
    }

    async fn get_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<HistoricalSeries, MarketDataError> {
        let endpoint = Self::chart_endpoint(symbol, timeframe);
        let points: Vec<IexChartPoint> = self.fetch(&endpoint, &[], symbol).await?;
        let total = points.len();

        let prices: Vec<PricePoint> = points
            .into_iter()
            .filter_map(Self::to_price_point)
            .collect();
        debug!(
            "IEX Cloud: {} of {} chart points usable for {} {}",
            prices.len(),
            total,
            symbol,
            timeframe
        );

        Ok(HistoricalSeries::normalize(
            symbol,
            timeframe,
            prices,
            self.max_entries(timeframe),
            PROVIDER_ID,
        ))
    }

    async fn get_exchange_rate(&self, pair: &CurrencyPair) -> Result<ExchangeRate, MarketDataError> {
        let joined = pair.joined();
        let subject = pair.to_string();
        let rates: Vec<IexFxRate> = self
            .fetch("fx/latest", &[("symbols", joined.as_str())], &subject)
            .await?;

        let first = rates
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::MalformedResponse {
                provider: PROVIDER_ID.to_string(),
                message: format!("no exchange rate for {}", subject),
            })?;
        let rate = first
            .rate
            .and_then(http::decimal_from_f64)
            .ok_or_else(|| MarketDataError::MalformedResponse {
                provider: PROVIDER_ID.to_string(),
                message: format!("missing rate for {}", subject),
            })?;
        let timestamp = first
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(ExchangeRate::new(pair.clone(), rate, PROVIDER_ID, timestamp))
    }

    async fn get_batch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        let mut quotes = Vec::with_capacity(symbols.len());

        for chunk in symbols.chunks(MAX_BATCH_SYMBOLS) {
            let list = chunk.join(",");
            let mut entries: HashMap<String, IexBatchEntry> = self
                .fetch(
                    "stock/market/batch",
                    &[("symbols", list.as_str()), ("types", "quote")],
                    &list,
                )
                .await?;

            for symbol in chunk {
                match entries.remove(symbol.as_str()).and_then(|entry| entry.quote) {
                    Some(raw) => match Self::to_quote(symbol, raw) {
                        Ok(quote) => quotes.push(quote),
                        Err(e) => debug!("IEX Cloud: skipping {} in batch: {}", symbol, e),
                    },
                    None => debug!("IEX Cloud: {} missing from batch response", symbol),
                }
            }
        }

        Ok(quotes)
    }
}
