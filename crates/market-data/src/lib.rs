//! Marketgate Market Data Crate
//!
//! Resilient multi-provider market data lookups: live quotes, price history
//! and currency exchange rates, normalized into one set of records while
//! upstream outages, rate limits, malformed and slow responses are hidden
//! behind caching, admission control, failover and graceful degradation.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  Caller / Host   |  get_quote / get_historical / get_exchange_rate
//! +------------------+
//!          |
//!          v
//! +-------------------+     +------------------+
//! | MarketDataService | --> |      Cache       |  (TTL, persisted via BlobStore)
//! +-------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |   RateLimiter    |  (burst / minute / hour windows, cooldown)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |    Providers     |  (Alpha Vantage, IEX Cloud, Yahoo, in priority order)
//! +------------------+
//!          |  all failed
//!          v
//! +-------------------+
//! | FailureClassifier |  (taxonomy, error log, cached/default fallback)
//! +-------------------+
//! ```
//!
//! # Core Types
//!
//! - [`MarketDataService`] - Orchestrates every lookup
//! - [`Quote`], [`HistoricalSeries`], [`ExchangeRate`] - Canonical records
//! - [`DataResponse`] - Envelope carrying the data and its [`Freshness`]
//! - [`LookupFailure`] - Terminal failure, only for unknown symbols
//! - [`MarketDataProvider`] - Contract every adapter implements
//! - [`BlobStore`] - Persistence collaborator supplied by the host
//!
//! # Example
//!
//! ```no_run
//! use marketgate_market_data::{MarketDataConfig, MarketDataService};
//!
//! # async fn run() {
//! let service = MarketDataService::from_config(MarketDataConfig::default(), None);
//! match service.get_quote("AAPL", false).await {
//!     Ok(response) if response.is_degraded() => {
//!         println!("{} (degraded): {:?}", response.data.price, response.data.warning)
//!     }
//!     Ok(response) => println!("{}", response.data.price),
//!     Err(failure) => println!("unknown symbol {}", failure.symbol),
//! }
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod failure;
pub mod models;
pub mod provider;
pub mod rate_limiter;
pub mod service;

// Re-export all public types from models
pub use models::{
    normalize_symbol, CachePayload, Currency, CurrencyPair, DataCategory, DataResponse,
    ExchangeRate, Freshness, HistoricalSeries, LookupFailure, PricePoint, ProviderId, Quote,
    Request, Symbol, Timeframe,
};

pub use cache::{fallback_key, BlobStore, Cache, CacheEntry, CacheStats, MemoryBlobStore, StoreError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, ConfigError, MarketDataConfig, MarketHoursConfig, ProviderConfig,
    ProvidersConfig, RateLimitConfig,
};
pub use errors::{ErrorKind, FallbackStrategy, MarketDataError};
pub use failure::{ErrorContext, ErrorRecord, ErrorStats, FailureClassifier, Fallback};
pub use rate_limiter::{Admission, RateLimitStatus, RateLimiter};

// Re-export provider types
pub use provider::{
    AlphaVantageProvider, Capability, IexCloudProvider, MarketDataProvider, ProviderCapabilities,
    ProviderStats, YahooProvider,
};

// Re-export service types
pub use service::{MarketDataService, MarketDataServiceBuilder, MarketStatus, ProbeResult, ProviderStatus};
