//! Yahoo Finance API response models.
//!
//! Covers the v7 quote endpoint (quotes and FX) and the v8 chart endpoint
//! (price history). Only fields we map are declared.

use serde::Deserialize;

/// Response wrapper for the v7 quote API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteResponse {
    pub quote_response: YahooQuoteResult,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteResult {
    #[serde(default)]
    pub result: Vec<YahooQuote>,
    pub error: Option<serde_json::Value>,
}

/// One entry of the v7 quote result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuote {
    pub regular_market_price: Option<f64>,
    pub post_market_price: Option<f64>,
    pub pre_market_price: Option<f64>,
    pub regular_market_previous_close: Option<f64>,
    pub regular_market_change: Option<f64>,
    pub regular_market_volume: Option<u64>,
    pub regular_market_day_high: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_open: Option<f64>,
    /// Unix seconds
    pub regular_market_time: Option<i64>,
    pub market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<f64>,
    pub currency: Option<String>,
    pub full_exchange_name: Option<String>,
}

impl YahooQuote {
    /// Regular session price, else the extended-hours prices.
    pub fn price(&self) -> Option<f64> {
        self.regular_market_price
            .or(self.post_market_price)
            .or(self.pre_market_price)
    }
}

/// Response wrapper for the v8 chart API
#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    pub result: Option<Vec<YahooChartResult>>,
    pub error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooChartError {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct YahooChartResult {
    /// Unix seconds, parallel to the indicator arrays
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooOhlcv>,
}

/// Column arrays; Yahoo leaves holes as `null`.
#[derive(Debug, Default, Deserialize)]
pub struct YahooOhlcv {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<u64>>,
}
