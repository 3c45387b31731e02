//! Alpha Vantage market data provider implementation.
//!
//! This module provides market data from the Alpha Vantage API:
//! - Latest quotes via the GLOBAL_QUOTE endpoint
//! - Intraday (5 min) bars via TIME_SERIES_INTRADAY for one-day charts
//! - Daily bars via TIME_SERIES_DAILY for everything longer
//! - FX rates via CURRENCY_EXCHANGE_RATE
//!
//! Errors are not always signalled by HTTP status: Alpha Vantage answers
//! 200 with an `Error Message`, `Note` or `Information` field instead.
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{
    CurrencyPair, ExchangeRate, HistoricalSeries, PricePoint, Quote, Timeframe,
};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderCapabilities, ProviderStats};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";
const ERROR_THRESHOLD: u64 = 5;

/// Alpha Vantage market data provider.
///
/// Requires an API key; without one the adapter reports itself as not
/// configured and is skipped.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    stats: ProviderStats,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// Fields Alpha Vantage uses to report problems inside a 200 response.
#[derive(Debug, Default, Deserialize)]
struct ApiNotice {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(flatten)]
    notice: ApiNotice,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
}

/// TIME_SERIES_INTRADAY and TIME_SERIES_DAILY responses.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (5min)")]
    intraday: Option<HashMap<String, Bar>>,
    #[serde(rename = "Time Series (Daily)")]
    daily: Option<HashMap<String, Bar>>,
    #[serde(flatten)]
    notice: ApiNotice,
}

#[derive(Debug, Deserialize)]
struct Bar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume", default)]
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<RealtimeRate>,
    #[serde(flatten)]
    notice: ApiNotice,
}

#[derive(Debug, Deserialize)]
struct RealtimeRate {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: String,
    #[serde(rename = "6. Last Refreshed")]
    last_refreshed: Option<String>,
}

// ============================================================================
// AlphaVantageProvider implementation
// ============================================================================

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider. `None` leaves it unconfigured.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http::build_client(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: BASE_URL.to_string(),
            stats: ProviderStats::new(ERROR_THRESHOLD),
        }
    }

    /// Point the adapter at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        function: &str,
        params: &[(&str, &str)],
        subject: &str,
    ) -> Result<T, MarketDataError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MarketDataError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            })?;

        let mut all_params: Vec<(&str, &str)> = vec![("function", function)];
        all_params.extend_from_slice(params);
        all_params.push(("apikey", api_key));

        let url = http::build_url(PROVIDER_ID, &self.base_url, &all_params)?;
        http::get_json(&self.client, PROVIDER_ID, url, subject, Some(api_key)).await
    }

    /// Turn an embedded notice into an error.
    fn check_api_error(notice: &ApiNotice, subject: &str) -> Result<(), MarketDataError> {
        if let Some(ref msg) = notice.error_message {
            // Unknown symbols come back as "Invalid API call"
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::SymbolNotFound(subject.to_string()));
            }
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                status: None,
                message: msg.clone(),
            });
        }

        // "Note" is how the free tier reports throttling
        if let Some(ref msg) = notice.note {
            debug!("Alpha Vantage note: {}", msg);
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if let Some(ref msg) = notice.information {
            let lowered = msg.to_lowercase();
            if lowered.contains("api call frequency")
                || lowered.contains("rate limit")
                || lowered.contains("requests per day")
            {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            if lowered.contains("apikey") || lowered.contains("api key") {
                return Err(MarketDataError::Unauthorized {
                    provider: PROVIDER_ID.to_string(),
                    message: msg.clone(),
                });
            }
            warn!("Alpha Vantage info: {}", msg);
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                status: None,
                message: msg.clone(),
            });
        }

        Ok(())
    }

    /// Parse a bar key: "2024-03-04" or "2024-03-04 15:55:00".
    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&dt));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }

    fn missing(field: &str) -> MarketDataError {
        MarketDataError::MalformedResponse {
            provider: PROVIDER_ID.to_string(),
            message: format!("missing or invalid '{}'", field),
        }
    }

    fn series_params(timeframe: Timeframe) -> (&'static str, Vec<(&'static str, &'static str)>) {
        match timeframe {
            Timeframe::OneDay => (
                "TIME_SERIES_INTRADAY",
                vec![("interval", "5min"), ("outputsize", "compact")],
            ),
            Timeframe::OneWeek | Timeframe::OneMonth => {
                ("TIME_SERIES_DAILY", vec![("outputsize", "compact")])
            }
            Timeframe::ThreeMonths | Timeframe::OneYear => {
                ("TIME_SERIES_DAILY", vec![("outputsize", "full")])
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &'static str {
        "Alpha Vantage"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            quote: true,
            historical: true,
            fx: true,
            batch: false,
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let response: GlobalQuoteResponse = self
            .fetch("GLOBAL_QUOTE", &[("symbol", symbol)], symbol)
            .await?;
        Self::check_api_error(&response.notice, symbol)?;

        // An unknown symbol yields an empty "Global Quote" object
        let quote = response
            .global_quote
            .filter(|q| q.price.is_some())
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        let field = |value: &Option<String>| value.as_deref().and_then(http::parse_decimal);
        let price = field(&quote.price).ok_or_else(|| Self::missing("05. price"))?;
        let previous_close = field(&quote.previous_close);

        let mut result = Quote::new(
            quote.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            price,
            PROVIDER_ID,
            Utc::now(),
        );
        if let Some(previous) = previous_close {
            result = result.with_change(price - previous);
        }
        result.open = field(&quote.open);
        result.previous_close = previous_close;
        result.high = field(&quote.high).unwrap_or(price);
        result.low = field(&quote.low).unwrap_or(price);
        result.volume = quote
            .volume
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        result.last_trade_time = quote.latest_trading_day;

        debug!("Alpha Vantage: quote for {} at {}", symbol, result.price);
        Ok(result)
    }

    async fn get_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<HistoricalSeries, MarketDataError> {
        let (function, extra) = Self::series_params(timeframe);
        let mut params = vec![("symbol", symbol)];
        params.extend(extra);

        let response: TimeSeriesResponse = self.fetch(function, &params, symbol).await?;
        Self::check_api_error(&response.notice, symbol)?;

        let bars = response
            .intraday
            .or(response.daily)
            .ok_or_else(|| Self::missing("Time Series"))?;

        let prices: Vec<PricePoint> = bars
            .into_iter()
            .filter_map(|(date, bar)| {
                Some(PricePoint {
                    date: Self::parse_timestamp(&date)?,
                    open: http::parse_decimal(&bar.open)?,
                    high: http::parse_decimal(&bar.high)?,
                    low: http::parse_decimal(&bar.low)?,
                    close: http::parse_decimal(&bar.close)?,
                    volume: bar
                        .volume
                        .as_deref()
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0),
                })
            })
            .collect();

        debug!(
            "Alpha Vantage: fetched {} {} bars for {}",
            prices.len(),
            timeframe,
            symbol
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
        let subject = pair.to_string();
        let response: ExchangeRateResponse = self
            .fetch(
                "CURRENCY_EXCHANGE_RATE",
                &[
                    ("from_currency", pair.from.as_str()),
                    ("to_currency", pair.to.as_str()),
                ],
                &subject,
            )
            .await?;
        Self::check_api_error(&response.notice, &subject)?;

        let realtime = response
            .rate
            .ok_or_else(|| Self::missing("Realtime Currency Exchange Rate"))?;
        let rate = http::parse_decimal(&realtime.exchange_rate)
            .ok_or_else(|| Self::missing("5. Exchange Rate"))?;
        let timestamp = realtime
            .last_refreshed
            .as_deref()
            .and_then(Self::parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(ExchangeRate::new(pair.clone(), rate, PROVIDER_ID, timestamp))
    }
}
