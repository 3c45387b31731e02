//! Market data models
//!
//! This module contains the canonical records every provider is normalized into:
//! - `types` - Type aliases for common identifiers (ProviderId, Symbol, Currency)
//! - `quote` - Current trading snapshot (Quote)
//! - `historical` - Price history (Timeframe, PricePoint, HistoricalSeries)
//! - `fx` - Currency conversion (CurrencyPair, ExchangeRate)
//! - `request` - Lookup descriptors and their cache keys (Request, DataCategory)
//! - `payload` - Cacheable union of the above (CachePayload)
//! - `response` - Envelopes returned to callers (DataResponse, LookupFailure)

mod fx;
mod historical;
mod payload;
mod quote;
mod request;
mod response;
mod types;

pub use fx::{CurrencyPair, ExchangeRate};
pub use historical::{HistoricalSeries, PricePoint, Timeframe};
pub use payload::CachePayload;
pub use quote::Quote;
pub use request::{DataCategory, Request};
pub use response::{DataResponse, Freshness, LookupFailure};
pub use types::{normalize_symbol, Currency, ProviderId, Symbol};
