//! Request orchestration.
//!
//! [`MarketDataService`] composes the cache, rate limiter, failure
//! classifier and provider adapters. Every lookup runs the same pipeline:
//!
//! ```text
//! cache check -> admission -> provider sweep(s) -> validate -> cache write
//!                    |                |
//!                    v                v
//!              cached/default    fallback (cached/default/terminal)
//! ```
//!
//! Providers are consulted in the configured priority order. The whole
//! sweep is retried `retry_attempts` times with a linearly growing delay
//! between sweeps; individual calls are never retried on their own. Only
//! unknown symbols surface as errors, everything else degrades to flagged
//! data.

mod market_hours;
mod single_flight;
mod validator;

pub use market_hours::{is_market_open, market_status, MarketStatus};
pub use single_flight::SingleFlight;
pub use validator::{ResponseValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cache::{fallback_key, BlobStore, Cache, CacheStats};
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::config::MarketDataConfig;
use crate::errors::{ErrorKind, MarketDataError};
use crate::failure::{ErrorContext, ErrorRecord, ErrorStats, FailureClassifier, Fallback};
use crate::models::{
    normalize_symbol, CachePayload, CurrencyPair, DataCategory, DataResponse, ExchangeRate,
    HistoricalSeries, LookupFailure, Quote, Request, Timeframe,
};
use crate::provider::{
    AlphaVantageProvider, Capability, IexCloudProvider, MarketDataProvider, ProviderCapabilities,
    ProviderStatsSnapshot, YahooProvider,
};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};

/// Source tag of same-currency rates.
pub const IDENTITY_SOURCE: &str = "IDENTITY";

/// Health view of one adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub configured: bool,
    pub capabilities: ProviderCapabilities,
    pub stats: ProviderStatsSnapshot,
}

/// Outcome of one connectivity probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub provider: String,
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Failure that ended a lookup's sweeps.
#[derive(Clone)]
struct LastFailure {
    kind: ErrorKind,
    error_id: String,
    message: String,
}

/// Builder for [`MarketDataService`].
pub struct MarketDataServiceBuilder {
    config: MarketDataConfig,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    store: Option<Arc<dyn BlobStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MarketDataServiceBuilder {
    pub fn provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn MarketDataProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Persist the cache through `store` and restore it on build.
    pub fn store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> MarketDataService {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let config = self.config;

        // Listed ids first in configured order, the rest in registration order.
        let mut providers = self.providers;
        providers.sort_by_key(|p| {
            config
                .provider_order
                .iter()
                .position(|id| id == p.id())
                .unwrap_or(usize::MAX)
        });

        let mut cache = Cache::new(&config.cache, clock.clone());
        if let Some(store) = self.store {
            cache = cache.with_store(store);
        }
        cache.load();

        let order: Vec<&str> = providers.iter().map(|p| p.id()).collect();
        info!("Market data service ready with providers {:?}", order);

        MarketDataService {
            rate_limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            classifier: FailureClassifier::new(config.error_log_capacity, clock.clone()),
            validator: ResponseValidator::new(),
            single_flight: config.single_flight.then(SingleFlight::new),
            providers,
            cache,
            clock,
            config,
        }
    }
}

/// Resilient multi-provider market data lookups.
pub struct MarketDataService {
    config: MarketDataConfig,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: Cache,
    rate_limiter: RateLimiter,
    classifier: FailureClassifier,
    validator: ResponseValidator,
    single_flight: Option<SingleFlight>,
    clock: Arc<dyn Clock>,
}

impl MarketDataService {
    pub fn builder(config: MarketDataConfig) -> MarketDataServiceBuilder {
        MarketDataServiceBuilder {
            config,
            providers: Vec::new(),
            store: None,
            clock: None,
        }
    }

    /// Build the service with the bundled adapters enabled in `config`.
    pub fn from_config(config: MarketDataConfig, store: Option<Arc<dyn BlobStore>>) -> Self {
        let settings = config.providers.clone();
        let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();

        if settings.alpha_vantage.enabled {
            let mut provider = AlphaVantageProvider::new(settings.alpha_vantage.api_key.clone());
            if let Some(url) = &settings.alpha_vantage.base_url {
                provider = provider.with_base_url(url.clone());
            }
            providers.push(Arc::new(provider));
        }
        if settings.iex_cloud.enabled {
            let mut provider =
                IexCloudProvider::new(settings.iex_cloud.api_key.clone(), settings.iex_cloud.sandbox);
            if let Some(url) = &settings.iex_cloud.base_url {
                provider = provider.with_base_url(url.clone());
            }
            providers.push(Arc::new(provider));
        }
        if settings.yahoo.enabled {
            let mut provider = YahooProvider::new();
            if let Some(url) = &settings.yahoo.base_url {
                provider = provider.with_base_url(url.clone());
            }
            providers.push(Arc::new(provider));
        }

        let mut builder = Self::builder(config).providers(providers);
        if let Some(store) = store {
            builder = builder.store(store);
        }
        builder.build()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Current quote for `symbol`.
    ///
    /// `Err` only for unknown (or empty) symbols. Every other failure is
    /// answered with cached or placeholder data flagged in the envelope.
    pub async fn get_quote(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<DataResponse<Quote>, LookupFailure> {
        let request = Request::Quote {
            symbol: normalize_symbol(symbol),
        };
        self.lookup(request, force_refresh).await
    }

    /// Quotes for several symbols, in input order.
    ///
    /// Cached quotes are served first. What is left goes out as one batch
    /// call when an adapter supports it, and the remainder is resolved
    /// concurrently one symbol at a time. One symbol's failure never affects
    /// another's.
    pub async fn get_quotes(
        &self,
        symbols: &[String],
        force_refresh: bool,
    ) -> Vec<Result<DataResponse<Quote>, LookupFailure>> {
        let normalized: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        let mut results: Vec<Option<Result<DataResponse<Quote>, LookupFailure>>> =
            normalized.iter().map(|_| None).collect();

        if !force_refresh {
            for (slot, symbol) in results.iter_mut().zip(&normalized) {
                if symbol.is_empty() {
                    continue;
                }
                let request = Request::Quote {
                    symbol: symbol.clone(),
                };
                if let Some(Ok(quote)) = self.cached(&request).map(Quote::try_from) {
                    *slot = Some(Ok(DataResponse::cached(quote)));
                }
            }
        }

        let mut missing: Vec<String> = normalized
            .iter()
            .zip(&results)
            .filter(|(symbol, slot)| slot.is_none() && !symbol.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        missing.sort();
        missing.dedup();

        if missing.len() > 1 {
            for quote in self.fetch_batch(&missing).await {
                for (slot, symbol) in results.iter_mut().zip(&normalized) {
                    if slot.is_none() && *symbol == quote.symbol {
                        *slot = Some(Ok(DataResponse::live(quote.clone())));
                    }
                }
            }
        }

        let pending: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect();
        let resolved = join_all(
            pending
                .iter()
                .map(|&i| self.get_quote(&normalized[i], force_refresh)),
        )
        .await;
        for (i, result) in pending.into_iter().zip(resolved) {
            results[i] = Some(result);
        }

        // Every slot is filled by now.
        results.into_iter().flatten().collect()
    }

    /// Price history for `symbol`, ascending by date.
    pub async fn get_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<DataResponse<HistoricalSeries>, LookupFailure> {
        let request = Request::Historical {
            symbol: normalize_symbol(symbol),
            timeframe,
        };
        self.lookup(request, false).await
    }

    /// Rate converting one unit of `from` into `to`.
    ///
    /// Same-currency pairs answer 1 without contacting any provider.
    pub async fn get_exchange_rate(
        &self,
        from: &str,
        to: &str,
    ) -> Result<DataResponse<ExchangeRate>, LookupFailure> {
        let pair = CurrencyPair::new(from, to);
        if pair.is_identity() && !pair.from.is_empty() {
            return Ok(DataResponse::live(ExchangeRate::new(
                pair,
                Decimal::ONE,
                IDENTITY_SOURCE,
                self.clock.now(),
            )));
        }
        self.lookup(Request::ExchangeRate { pair }, false).await
    }

    // =========================================================================
    // Status and maintenance
    // =========================================================================

    /// Call every configured quote-capable adapter once with `symbol`.
    ///
    /// Probes count against the rate limiter and update adapter stats, but
    /// nothing is cached.
    pub async fn probe_providers(&self, symbol: &str) -> Vec<ProbeResult> {
        let request = Request::Quote {
            symbol: normalize_symbol(symbol),
        };
        let mut results = Vec::new();

        for provider in &self.providers {
            if !provider.capabilities().supports(Capability::Quote) || !provider.is_configured() {
                continue;
            }

            let admission = self.rate_limiter.try_admit();
            if !admission.is_admitted() {
                results.push(ProbeResult {
                    provider: provider.id().to_string(),
                    success: false,
                    latency_ms: 0,
                    error: Some(format!("Not admitted by rate limiter ({:?})", admission)),
                });
                continue;
            }

            let started = Instant::now();
            let outcome = self.attempt(provider.as_ref(), &request).await;
            let latency_ms = duration_millis(started.elapsed());
            info!(
                "Probe of {} finished in {}ms: {}",
                provider.id(),
                latency_ms,
                if outcome.is_ok() { "ok" } else { "failed" }
            );
            results.push(ProbeResult {
                provider: provider.id().to_string(),
                success: outcome.is_ok(),
                latency_ms,
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        results
    }

    /// Side-effect free snapshot of every adapter, in priority order.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| ProviderStatus {
                id: p.id().to_string(),
                name: p.name().to_string(),
                configured: p.is_configured(),
                capabilities: p.capabilities(),
                stats: p.stats().snapshot(),
            })
            .collect()
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.classifier.error_stats()
    }

    /// Newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.classifier.recent_errors(limit)
    }

    pub fn market_status(&self) -> MarketStatus {
        market_status(&self.config.market_hours, self.clock.now())
    }

    /// Drop every cached entry, including the persisted copy.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Purge expired entries. Returns how many were removed.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    /// Upper bound on the time a single lookup spends before falling back.
    pub fn worst_case_latency(&self) -> Duration {
        self.config.worst_case_latency(self.providers.len())
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    async fn lookup<T>(
        &self,
        request: Request,
        force_refresh: bool,
    ) -> Result<DataResponse<T>, LookupFailure>
    where
        T: TryFrom<CachePayload, Error = CachePayload>,
    {
        let response = self.resolve(&request, force_refresh).await?;
        let DataResponse {
            data,
            freshness,
            retry_after_ms,
            error_id,
        } = response;

        match T::try_from(data) {
            Ok(data) => Ok(DataResponse {
                data,
                freshness,
                retry_after_ms,
                error_id,
            }),
            Err(other) => {
                // Keys are namespaced per category, so this means a bug upstream.
                let error = MarketDataError::MalformedResponse {
                    provider: other.source().to_string(),
                    message: format!("unexpected {} payload", request.operation()),
                };
                Err(self.failure(&request, &error))
            }
        }
    }

    async fn resolve(
        &self,
        request: &Request,
        force_refresh: bool,
    ) -> Result<DataResponse<CachePayload>, LookupFailure> {
        if request.subject().trim().is_empty() || Self::has_blank_currency(request) {
            let error = MarketDataError::SymbolNotFound(request.subject());
            return Err(self.failure(request, &error));
        }

        if !force_refresh {
            if let Some(payload) = self.cached(request) {
                return Ok(DataResponse::cached(payload));
            }
        }

        let key = request.cache_key();
        let _flight = match &self.single_flight {
            Some(flight) => {
                let guard = flight.acquire(&key).await;
                // Whoever held the key may have just filled it.
                if !force_refresh {
                    if let Some(payload) = self.cached(request) {
                        return Ok(DataResponse::cached(payload));
                    }
                }
                Some(guard)
            }
            None => None,
        };

        let admission = self.rate_limiter.try_admit();
        if !admission.is_admitted() {
            let delay = self.rate_limiter.get_optimal_delay();
            warn!(
                "Request for {} {} not admitted ({:?}), serving degraded data",
                request.operation(),
                request.subject(),
                admission
            );
            return self.degrade(request, ErrorKind::UpstreamRateLimited, None, delay);
        }

        let last = match self.sweep(request).await {
            Ok(payload) => return Ok(DataResponse::live(payload)),
            Err(last) => last,
        };

        if last.kind == ErrorKind::SymbolNotFound {
            info!("{} reported unknown by a provider", request.subject());
            return Err(LookupFailure {
                symbol: request.subject(),
                error_kind: last.kind,
                error_id: last.error_id,
                message: last.message,
                retry_after_ms: duration_millis(last.kind.retry_after()),
            });
        }

        warn!(
            "All providers failed for {} {} ({}), serving degraded data",
            request.operation(),
            request.subject(),
            last.kind
        );
        self.degrade(request, last.kind, Some(last.error_id), last.kind.retry_after())
    }

    /// Run up to `retry_attempts` sweeps over the providers.
    ///
    /// Returns the first validated payload. Otherwise the failure is the
    /// first SymbolNotFound any provider reported, if one did, else the last
    /// failure seen. A sweep where every attempted provider reported the
    /// symbol unknown ends the lookup early.
    async fn sweep(&self, request: &Request) -> Result<CachePayload, LastFailure> {
        let capability = Capability::for_request(request);
        let attempts = self.config.retry_attempts.max(1);
        let mut last: Option<LastFailure> = None;
        let mut unknown: Option<LastFailure> = None;

        for sweep in 1..=attempts {
            let mut attempted = 0;
            let mut not_found = 0;

            for provider in &self.providers {
                if !provider.capabilities().supports(capability) {
                    continue;
                }
                if !provider.is_available() {
                    debug!("Provider '{}' unavailable, skipping", provider.id());
                    continue;
                }
                attempted += 1;

                match self.attempt(provider.as_ref(), request).await {
                    Ok(payload) => {
                        info!(
                            "Fetched {} {} from {}",
                            request.operation(),
                            request.subject(),
                            provider.id()
                        );
                        self.write_through(request, &payload);
                        return Ok(payload);
                    }
                    Err(error) => {
                        let kind = error.kind();
                        let context = ErrorContext::for_request(request).with_provider(provider.id());
                        let error_id = self.classifier.log_error(&error, context);
                        warn!(
                            "Provider '{}' failed for {}: {}, trying next",
                            provider.id(),
                            request.subject(),
                            error
                        );
                        let failure = LastFailure {
                            kind,
                            error_id,
                            message: error.to_string(),
                        };
                        if kind == ErrorKind::SymbolNotFound {
                            not_found += 1;
                            if unknown.is_none() {
                                unknown = Some(failure.clone());
                            }
                        }
                        last = Some(failure);
                    }
                }
            }

            if attempted == 0 {
                let error = MarketDataError::NoProvidersAvailable;
                let error_id = self
                    .classifier
                    .log_error(&error, ErrorContext::for_request(request));
                return Err(unknown.or(last).unwrap_or(LastFailure {
                    kind: error.kind(),
                    error_id,
                    message: error.to_string(),
                }));
            }
            if not_found == attempted {
                break;
            }
            if sweep < attempts {
                let delay = self.config.retry_delay() * sweep;
                debug!(
                    "Sweep {}/{} for {} failed, waiting {:?}",
                    sweep,
                    attempts,
                    request.subject(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(unknown.or(last).unwrap_or_else(|| {
            let error = MarketDataError::AllProvidersFailed;
            LastFailure {
                kind: error.kind(),
                error_id: self
                    .classifier
                    .log_error(&error, ErrorContext::for_request(request)),
                message: error.to_string(),
            }
        }))
    }

    /// One bounded provider call, validated, with stats recorded.
    ///
    /// A call that outlives the timeout is dropped; nothing it would have
    /// produced reaches the cache or the stats. If the caller drops this
    /// future instead, the call guard gives back any probe slot it held.
    async fn attempt(
        &self,
        provider: &dyn MarketDataProvider,
        request: &Request,
    ) -> Result<CachePayload, MarketDataError> {
        let stats = provider.stats();
        let call = stats.begin_call();
        stats.record_request();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.config.attempt_timeout(),
            Self::call_provider(provider, request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(MarketDataError::Timeout {
                provider: provider.id().to_string(),
            }),
        };
        let latency = started.elapsed();

        let result = outcome.and_then(|payload| {
            self.validator.validate(&payload)?;
            Ok(payload)
        });

        match &result {
            // The adapter answered correctly; the symbol is the caller's problem.
            Ok(_) | Err(MarketDataError::SymbolNotFound(_)) => call.success(latency),
            Err(error) => call.failure(&error.to_string(), latency),
        }
        result
    }

    async fn call_provider(
        provider: &dyn MarketDataProvider,
        request: &Request,
    ) -> Result<CachePayload, MarketDataError> {
        match request {
            Request::Quote { symbol } => provider.get_quote(symbol).await.map(CachePayload::from),
            Request::Historical { symbol, timeframe } => provider
                .get_historical(symbol, *timeframe)
                .await
                .map(CachePayload::from),
            Request::ExchangeRate { pair } => provider
                .get_exchange_rate(pair)
                .await
                .map(CachePayload::from),
        }
    }

    /// One batch call for `symbols` through the first usable batch adapter.
    ///
    /// Returns the validated quotes it produced; anything missing falls
    /// through to single lookups.
    async fn fetch_batch(&self, symbols: &[String]) -> Vec<Quote> {
        let Some(provider) = self
            .providers
            .iter()
            .filter(|p| p.capabilities().supports(Capability::Batch))
            .find(|p| p.is_available())
        else {
            debug!("No batch adapter available, resolving symbols one by one");
            return Vec::new();
        };

        let stats = provider.stats();
        let call = stats.begin_call();
        if !self.rate_limiter.try_admit().is_admitted() {
            debug!("Batch quote call not admitted, resolving symbols one by one");
            return Vec::new();
        }
        stats.record_request();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.config.attempt_timeout(),
            provider.get_batch_quotes(symbols),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(MarketDataError::Timeout {
                provider: provider.id().to_string(),
            }),
        };
        let latency = started.elapsed();

        let quotes = match outcome {
            Ok(quotes) => {
                call.success(latency);
                quotes
            }
            Err(error) => {
                call.failure(&error.to_string(), latency);
                let context = ErrorContext::new("batch_quotes").with_provider(provider.id());
                self.classifier.log_error(&error, context);
                warn!("Batch quote call to '{}' failed: {}", provider.id(), error);
                return Vec::new();
            }
        };

        let mut accepted = Vec::new();
        for mut quote in quotes {
            quote.symbol = normalize_symbol(&quote.symbol);
            if !symbols.contains(&quote.symbol) {
                continue;
            }
            if let Err(e) = self.validator.validate_quote(&quote) {
                warn!("Dropping batch quote from '{}': {}", provider.id(), e);
                continue;
            }
            let request = Request::Quote {
                symbol: quote.symbol.clone(),
            };
            self.write_through(&request, &CachePayload::from(quote.clone()));
            accepted.push(quote);
        }
        info!(
            "Batch call to '{}' returned {}/{} quotes",
            provider.id(),
            accepted.len(),
            symbols.len()
        );
        accepted
    }

    /// Fresh cache entry for `request`, if it has the right shape.
    fn cached(&self, request: &Request) -> Option<CachePayload> {
        self.cache
            .get(&request.cache_key())
            .filter(|payload| payload.matches(request))
    }

    /// Best copy to degrade to: the fresh entry, else the long-lived one.
    fn last_known(&self, request: &Request) -> Option<CachePayload> {
        let key = request.cache_key();
        self.cache
            .get(&key)
            .or_else(|| self.cache.get(&fallback_key(&key)))
    }

    fn write_through(&self, request: &Request, payload: &CachePayload) {
        let key = request.cache_key();
        self.cache.set(&key, payload.clone(), self.ttl_for(request.category()));
        self.cache
            .set(&fallback_key(&key), payload.clone(), self.config.cache.fallback_ttl());
    }

    fn ttl_for(&self, category: DataCategory) -> Duration {
        let cache = &self.config.cache;
        match category {
            DataCategory::Realtime => {
                if is_market_open(&self.config.market_hours, self.clock.now()) {
                    cache.realtime_ttl()
                } else {
                    cache.after_hours_ttl()
                }
            }
            DataCategory::Historical => cache.historical_ttl(),
            DataCategory::Currency => cache.currency_ttl(),
        }
    }

    fn degrade(
        &self,
        request: &Request,
        kind: ErrorKind,
        error_id: Option<String>,
        retry_after: Duration,
    ) -> Result<DataResponse<CachePayload>, LookupFailure> {
        match self
            .classifier
            .fallback_for(kind, request, self.last_known(request))
        {
            Fallback::Data { payload, freshness } => Ok(DataResponse::degraded(
                payload,
                freshness,
                retry_after,
                error_id,
            )),
            Fallback::Terminal => Err(LookupFailure {
                symbol: request.subject(),
                error_kind: kind,
                error_id: error_id.unwrap_or_default(),
                message: format!("{} for {}", kind, request.subject()),
                retry_after_ms: duration_millis(retry_after),
            }),
        }
    }

    /// Log `error` and turn it into a terminal failure envelope.
    fn failure(&self, request: &Request, error: &MarketDataError) -> LookupFailure {
        let kind = error.kind();
        let error_id = self
            .classifier
            .log_error(error, ErrorContext::for_request(request));
        LookupFailure {
            symbol: request.subject(),
            error_kind: kind,
            error_id,
            message: error.to_string(),
            retry_after_ms: duration_millis(kind.retry_after()),
        }
    }

    fn has_blank_currency(request: &Request) -> bool {
        match request {
            Request::ExchangeRate { pair } => pair.from.is_empty() || pair.to.is_empty(),
            _ => false,
        }
    }
}
