//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all adapters implement
//! - Capability descriptors and per-adapter health stats
//! - Concrete adapters (Alpha Vantage, IEX Cloud, Yahoo Finance)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: The service only talks to `MarketDataProvider`
//! - **Extensible**: New sources can be added by implementing the trait
//! - **Self-reporting**: Each adapter owns its [`ProviderStats`] and
//!   availability gate; global admission is left to the rate limiter

mod capabilities;
pub(crate) mod http;
mod stats;
mod traits;

pub mod alpha_vantage;
pub mod iex_cloud;
pub mod yahoo;

// Re-exports
pub use capabilities::{Capability, ProviderCapabilities};
pub use stats::{
    AvailabilityState, CallGuard, ProviderStats, ProviderStatsSnapshot, DEFAULT_RECOVERY_TIMEOUT,
};
pub use traits::MarketDataProvider;

pub use alpha_vantage::AlphaVantageProvider;
pub use iex_cloud::IexCloudProvider;
pub use yahoo::YahooProvider;
