//! Service configuration.
//!
//! Every knob is settable at construction, typically from a JSON document
//! with camelCase keys. Missing keys fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProviderId;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration of the market data service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketDataConfig {
    /// Number of full provider sweeps before falling back
    pub retry_attempts: u32,
    /// Base delay between sweeps; sweep n waits `retry_delay_ms * n`
    pub retry_delay_ms: u64,
    /// Upper bound on a single provider call
    pub attempt_timeout_ms: u64,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    /// Provider ids in priority order
    pub provider_order: Vec<ProviderId>,
    /// Deduplicate concurrent misses for the same cache key
    pub single_flight: bool,
    pub error_log_capacity: usize,
    pub market_hours: MarketHoursConfig,
    pub providers: ProvidersConfig,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            attempt_timeout_ms: 10_000,
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            provider_order: vec![
                "ALPHA_VANTAGE".to_string(),
                "IEX_CLOUD".to_string(),
                "YAHOO".to_string(),
            ],
            single_flight: false,
            error_log_capacity: 100,
            market_hours: MarketHoursConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl MarketDataConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MarketDataConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retryAttempts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "attemptTimeoutMs must be positive".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.maxEntries must be positive".to_string(),
            ));
        }
        if self.error_log_capacity == 0 {
            return Err(ConfigError::Invalid(
                "errorLogCapacity must be positive".to_string(),
            ));
        }
        self.rate_limit.validate()?;
        self.market_hours.validate()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Longest a single lookup can take before falling back.
    ///
    /// Every sweep may hit the attempt timeout on every provider, and sweep
    /// n is followed by a `retry_delay * n` wait.
    pub fn worst_case_latency(&self, provider_count: usize) -> Duration {
        let attempts = self.retry_attempts as u64;
        let calls = attempts * provider_count as u64;
        let waits = attempts * attempts.saturating_sub(1) / 2;
        Duration::from_millis(calls * self.attempt_timeout_ms + waits * self.retry_delay_ms)
    }
}

/// Cache durations and capacity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub realtime_ttl_ms: u64,
    /// Realtime TTL while the market is closed
    pub after_hours_ttl_ms: u64,
    pub historical_ttl_ms: u64,
    pub currency_ttl_ms: u64,
    /// Lifetime of the last-known-good copies used for degraded responses
    pub fallback_ttl_ms: u64,
    pub max_entries: usize,
    /// Blob-store key holding the persisted cache
    pub storage_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            realtime_ttl_ms: 5 * 60 * 1_000,
            after_hours_ttl_ms: 60 * 60 * 1_000,
            historical_ttl_ms: 24 * 60 * 60 * 1_000,
            currency_ttl_ms: 30 * 60 * 1_000,
            fallback_ttl_ms: 7 * 24 * 60 * 60 * 1_000,
            max_entries: 1_000,
            storage_key: "marketDataCache".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn realtime_ttl(&self) -> Duration {
        Duration::from_millis(self.realtime_ttl_ms)
    }

    pub fn after_hours_ttl(&self) -> Duration {
        Duration::from_millis(self.after_hours_ttl_ms)
    }

    pub fn historical_ttl(&self) -> Duration {
        Duration::from_millis(self.historical_ttl_ms)
    }

    pub fn currency_ttl(&self) -> Duration {
        Duration::from_millis(self.currency_ttl_ms)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_millis(self.fallback_ttl_ms)
    }
}

/// Admission control limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
    pub burst_limit: u32,
    pub burst_window_ms: u64,
    /// Lockout entered when the minute or hour window is exceeded
    pub cooldown_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 60,
            max_per_hour: 1_000,
            burst_limit: 10,
            burst_window_ms: 5_000,
            cooldown_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_minute == 0 || self.max_per_hour == 0 || self.burst_limit == 0 {
            return Err(ConfigError::Invalid(
                "rate limits must be positive".to_string(),
            ));
        }
        if self.burst_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rateLimit.burstWindowMs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Coarse trading-hours window at a fixed UTC offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketHoursConfig {
    pub utc_offset_hours: i32,
    pub open_hour: u32,
    /// Inclusive: the whole closing hour counts as open
    pub close_hour: u32,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: -5,
            open_hour: 9,
            close_hour: 16,
        }
    }
}

impl MarketHoursConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(-23..=23).contains(&self.utc_offset_hours) {
            return Err(ConfigError::Invalid(
                "marketHours.utcOffsetHours must be within +/-23".to_string(),
            ));
        }
        if self.open_hour > self.close_hour || self.close_hour > 23 {
            return Err(ConfigError::Invalid(
                "marketHours open/close hours are out of range".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-adapter settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub alpha_vantage: ProviderConfig,
    pub iex_cloud: ProviderConfig,
    pub yahoo: ProviderConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Override of the provider's API root
    pub base_url: Option<String>,
    /// IEX Cloud only: use the sandbox environment
    pub sandbox: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            sandbox: false,
        }
    }
}
