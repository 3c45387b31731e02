//! Yahoo Finance market data provider.
//!
//! This provider uses the public Yahoo Finance endpoints to fetch:
//! - Latest quotes (v7 quote API)
//! - Price history (v8 chart API, interval chosen per timeframe)
//! - Foreign exchange rates (e.g., EURUSD=X through the quote API)
//!
//! No API key is needed. Nordic index symbols are mapped onto Yahoo's
//! caret-prefixed tickers; more mappings can be added at runtime.

mod models;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{CurrencyPair, ExchangeRate, HistoricalSeries, PricePoint, Quote, Timeframe};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderCapabilities, ProviderStats};

use models::{YahooChartResponse, YahooQuote, YahooQuoteResponse};

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const PROVIDER_ID: &str = "YAHOO";
const ERROR_THRESHOLD: u64 = 10;

/// Weekly bars for a year.
const ONE_YEAR_WEEKLY_BARS: usize = 53;

const DEFAULT_SYMBOL_MAPPINGS: &[(&str, &str)] = &[
    ("OMXH25", "^OMXH25"),
    ("OMXHPI", "^OMXHPI"),
    ("OMXS30", "^OMXS30"),
];

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    client: Client,
    base_url: String,
    symbol_mappings: RwLock<HashMap<String, String>>,
    stats: ProviderStats,
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooProvider {
    pub fn new() -> Self {
        let mappings = DEFAULT_SYMBOL_MAPPINGS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        Self {
            client: http::build_client(),
            base_url: BASE_URL.to_string(),
            symbol_mappings: RwLock::new(mappings),
            stats: ProviderStats::new(ERROR_THRESHOLD),
        }
    }

    /// Point the adapter at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Route `symbol` to `yahoo_symbol` from now on.
    pub fn add_symbol_mapping(&self, symbol: &str, yahoo_symbol: &str) {
        let mut mappings = self
            .symbol_mappings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mappings.insert(symbol.to_uppercase(), yahoo_symbol.to_string());
        debug!("Yahoo: mapping {} -> {}", symbol, yahoo_symbol);
    }

    fn map_symbol(&self, symbol: &str) -> String {
        self.symbol_mappings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }

    fn chart_interval(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneDay => "5m",
            Timeframe::OneWeek => "1h",
            Timeframe::OneMonth | Timeframe::ThreeMonths => "1d",
            Timeframe::OneYear => "1wk",
        }
    }

    fn malformed(message: impl Into<String>) -> MarketDataError {
        MarketDataError::MalformedResponse {
            provider: PROVIDER_ID.to_string(),
            message: message.into(),
        }
    }

    /// Fetch the first v7 quote for `yahoo_symbol`.
    async fn fetch_quote(&self, yahoo_symbol: &str, subject: &str) -> Result<YahooQuote, MarketDataError> {
        let url = http::build_url(
            PROVIDER_ID,
            &format!("{}/v7/finance/quote", self.base_url),
            &[("symbols", yahoo_symbol)],
        )?;
        let response: YahooQuoteResponse =
            http::get_json(&self.client, PROVIDER_ID, url, subject, None).await?;

        if let Some(error) = response.quote_response.error.filter(|e| !e.is_null()) {
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                status: None,
                message: error.to_string(),
            });
        }

        response
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::SymbolNotFound(subject.to_string()))
    }

    fn to_quote(symbol: &str, raw: YahooQuote) -> Result<Quote, MarketDataError> {
        let price = raw
            .price()
            .and_then(http::decimal_from_f64)
            .ok_or_else(|| Self::malformed(format!("no price for {}", symbol)))?;
        let previous_close = raw
            .regular_market_previous_close
            .and_then(http::decimal_from_f64);
        let change = raw
            .regular_market_change
            .and_then(http::decimal_from_f64)
            .or_else(|| previous_close.map(|previous| price - previous))
            .unwrap_or(Decimal::ZERO);

        let timestamp = raw
            .regular_market_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(symbol, price, PROVIDER_ID, timestamp).with_change(change);
        quote.volume = raw.regular_market_volume.unwrap_or(0);
        quote.high = raw
            .regular_market_day_high
            .and_then(http::decimal_from_f64)
            .unwrap_or(price);
        quote.low = raw
            .regular_market_day_low
            .and_then(http::decimal_from_f64)
            .unwrap_or(price);
        quote.open = raw.regular_market_open.and_then(http::decimal_from_f64);
        quote.previous_close = previous_close;
        quote.market_cap = raw.market_cap.and_then(http::decimal_from_f64);
        quote.pe_ratio = raw.trailing_pe.and_then(http::decimal_from_f64);
        quote.currency = raw.currency;
        quote.exchange_name = raw.full_exchange_name;
        quote.last_trade_time = raw.regular_market_time.map(|secs| secs.to_string());
        Ok(quote)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &'static str {
        "Yahoo Finance"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            quote: true,
            historical: true,
            fx: true,
            batch: false,
        }
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    fn max_entries(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::OneYear => ONE_YEAR_WEEKLY_BARS,
            other => other.max_points(),
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let mapped = self.map_symbol(symbol);
        let raw = self.fetch_quote(&mapped, symbol).await?;
        Self::to_quote(symbol, raw)
    }

    async fn get_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<HistoricalSeries, MarketDataError> {
        let mapped = self.map_symbol(symbol);
        let now = Utc::now();
        let period1 = (now - timeframe.lookback()).timestamp().to_string();
        let period2 = now.timestamp().to_string();

        let url = http::build_url(
            PROVIDER_ID,
            &format!("{}/v8/finance/chart/{}", self.base_url, encode(&mapped)),
            &[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", Self::chart_interval(timeframe)),
            ],
        )?;
        let response: YahooChartResponse =
            http::get_json(&self.client, PROVIDER_ID, url, symbol, None).await?;

        if let Some(error) = response.chart.error {
            let description = error.description.unwrap_or_default();
            if error.code.as_deref() == Some("Not Found") {
                return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
            }
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                status: None,
                message: description,
            });
        }

        let result = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;
        let columns = result.indicators.quote.into_iter().next().unwrap_or_default();

        let at = |column: &[Option<f64>], i: usize| {
            column.get(i).copied().flatten().and_then(http::decimal_from_f64)
        };

        let prices: Vec<PricePoint> = result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, secs)| {
                // Bars without a close are holes, not zeros
                let close = at(&columns.close, i)?;
                Some(PricePoint {
                    date: Utc.timestamp_opt(*secs, 0).single()?,
                    open: at(&columns.open, i).unwrap_or(close),
                    high: at(&columns.high, i).unwrap_or(close),
                    low: at(&columns.low, i).unwrap_or(close),
                    close,
                    volume: columns.volume.get(i).copied().flatten().unwrap_or(0),
                })
            })
            .collect();

        if prices.len() < result.timestamp.len() {
            debug!(
                "Yahoo: dropped {} empty bars for {}",
                result.timestamp.len() - prices.len(),
                symbol
            );
        }

        Ok(HistoricalSeries::normalize(
            symbol,
            timeframe,
            prices,
            self.max_entries(timeframe),
            PROVIDER_ID,
        ))
    }

    async fn get_exchange_rate(&self, pair: &CurrencyPair) -> Result<ExchangeRate, MarketDataError> {
        let fx_symbol = format!("{}=X", pair.joined());
        let subject = pair.to_string();
        let raw = self.fetch_quote(&fx_symbol, &subject).await?;

        let rate = raw
            .price()
            .and_then(http::decimal_from_f64)
            .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
            .ok_or_else(|| {
                warn!("Yahoo: invalid exchange rate for {}", subject);
                Self::malformed(format!("invalid exchange rate for {}", subject))
            })?;
        let timestamp = raw
            .regular_market_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(ExchangeRate::new(pair.clone(), rate, PROVIDER_ID, timestamp))
    }
}
