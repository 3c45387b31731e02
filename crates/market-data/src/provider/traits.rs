//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data adapters must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{CurrencyPair, ExchangeRate, HistoricalSeries, Quote, Timeframe};

use super::capabilities::ProviderCapabilities;
use super::stats::ProviderStats;

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source. The
/// service consults adapters in its configured priority order and skips any
/// whose [`is_available`](Self::is_available) returns false.
///
/// Adapters return data already normalized into the canonical records and
/// raise [`MarketDataError`] variants that classify into the shared
/// taxonomy. Stats are recorded by the caller, not by the adapter itself.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use marketgate_market_data::provider::{MarketDataProvider, ProviderCapabilities, ProviderStats};
///
/// struct MyProvider {
///     stats: ProviderStats,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities { quote: true, historical: false, fx: false, batch: false }
///     }
///
///     fn stats(&self) -> &ProviderStats {
///         &self.stats
///     }
///
///     // ... implement get_quote
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// A constant string like "YAHOO" or "ALPHA_VANTAGE", matched against
    /// the configured provider order.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str {
        self.id()
    }

    fn capabilities(&self) -> ProviderCapabilities;

    /// Whether the adapter has everything it needs (usually an API key).
    fn is_configured(&self) -> bool {
        true
    }

    fn stats(&self) -> &ProviderStats;

    /// Most points this adapter returns for `timeframe`.
    fn max_entries(&self, timeframe: Timeframe) -> usize {
        timeframe.max_points()
    }

    /// Circuit-breaker-lite gate. May claim the single recovery probe.
    fn is_available(&self) -> bool {
        self.stats().is_available(self.is_configured())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("quote"))
    }

    /// Fetch price history. Points may come back in any order; the
    /// returned series must already be normalized.
    async fn get_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<HistoricalSeries, MarketDataError> {
        let _ = (symbol, timeframe);
        Err(self.not_supported("historical"))
    }

    async fn get_exchange_rate(&self, pair: &CurrencyPair) -> Result<ExchangeRate, MarketDataError> {
        let _ = pair;
        Err(self.not_supported("exchange_rate"))
    }

    /// Fetch several quotes in one upstream call.
    ///
    /// Symbols the provider does not know are simply absent from the result.
    async fn get_batch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        let _ = symbols;
        Err(self.not_supported("batch_quotes"))
    }

    #[doc(hidden)]
    fn not_supported(&self, operation: &str) -> MarketDataError {
        MarketDataError::NotSupported {
            operation: operation.to_string(),
            provider: self.id().to_string(),
        }
    }
}
