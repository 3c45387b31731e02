//! Failure classification, the error log and degraded responses.
//!
//! [`FailureClassifier`] is the single place that decides what a caller gets
//! back once every provider has failed: a relabelled cached copy, a
//! deterministic placeholder, or a terminal error for unknown symbols.

pub mod defaults;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::{ErrorKind, FallbackStrategy, MarketDataError};
use crate::models::{CachePayload, Freshness, Request, Timeframe};

/// Source tag of cached data served in place of a live answer.
pub const CACHE_FALLBACK_SOURCE: &str = "CACHE_FALLBACK";

/// Number of most common kinds reported by [`ErrorStats`].
const TOP_KINDS: usize = 3;

/// Recent errors above which the health score bottoms out.
const HEALTH_FLOOR_ERRORS: usize = 50;

/// Where an error happened.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn for_request(request: &Request) -> Self {
        Self {
            operation: request.operation().to_string(),
            symbol: Some(request.subject()),
            timeframe: request.timeframe(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// One entry of the error log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub context: ErrorContext,
    pub message: String,
}

/// Aggregates over the error log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total_errors: usize,
    /// Errors logged within the last hour
    pub recent_errors: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    /// Up to three kinds, most frequent first
    pub most_common: Vec<(ErrorKind, usize)>,
    /// 100 with no recent errors, minus 2 per recent error, floored at 0
    pub health_score: u8,
}

/// Outcome of [`FailureClassifier::fallback_for`].
#[derive(Clone, Debug, PartialEq)]
pub enum Fallback {
    /// Degraded data to hand back, flagged with its provenance.
    Data {
        payload: CachePayload,
        freshness: Freshness,
    },
    /// Nothing may be synthesized; the caller gets an error.
    Terminal,
}

/// Classifies failures, keeps a bounded error log and builds fallbacks.
pub struct FailureClassifier {
    log: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl FailureClassifier {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    fn lock_log(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.log.lock().unwrap_or_else(|poisoned| {
            warn!("Error log mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn classify(&self, error: &MarketDataError) -> ErrorKind {
        error.kind()
    }

    /// Record `error` and return its correlation id.
    ///
    /// The oldest record is dropped once the log is full.
    pub fn log_error(&self, error: &MarketDataError, context: ErrorContext) -> String {
        let kind = self.classify(error);
        let id = Uuid::new_v4().to_string();
        let message = error.to_string();

        warn!(
            "[{}] {} during {} ({}{}): {}",
            id,
            kind,
            context.operation,
            context.symbol.as_deref().unwrap_or("-"),
            context
                .provider
                .as_deref()
                .map(|p| format!(" via {}", p))
                .unwrap_or_default(),
            message
        );

        let record = ErrorRecord {
            id: id.clone(),
            timestamp: self.clock.now(),
            kind,
            context,
            message,
        };

        let mut log = self.lock_log();
        while log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(record);
        id
    }

    /// Degraded answer for `request` after a failure of `kind`.
    ///
    /// `cached` is the best copy the caller could find, fresh or not. Only
    /// unknown symbols are terminal; every other kind ends in cached data
    /// when there is some and a placeholder otherwise.
    pub fn fallback_for(
        &self,
        kind: ErrorKind,
        request: &Request,
        cached: Option<CachePayload>,
    ) -> Fallback {
        let strategy = kind.fallback_strategy();
        if strategy == FallbackStrategy::Terminal {
            debug!("No fallback for {} on {}", kind, request.subject());
            return Fallback::Terminal;
        }

        match cached.filter(|payload| payload.matches(request)) {
            Some(payload) => {
                let warning = format!(
                    "Showing last known {} data for {} ({})",
                    request.operation(),
                    request.subject(),
                    kind
                );
                Fallback::Data {
                    payload: payload.degrade(CACHE_FALLBACK_SOURCE, warning, false),
                    freshness: Freshness::Fallback,
                }
            }
            None => {
                debug!(
                    "No cached {} for {}, using placeholder ({:?})",
                    request.operation(),
                    request.subject(),
                    strategy
                );
                Fallback::Data {
                    payload: defaults::default_payload(request, self.clock.now()),
                    freshness: Freshness::Default,
                }
            }
        }
    }

    pub fn error_stats(&self) -> ErrorStats {
        let cutoff = self.clock.now() - Duration::hours(1);
        let log = self.lock_log();

        let mut errors_by_kind = BTreeMap::new();
        for record in log.iter() {
            *errors_by_kind.entry(record.kind).or_insert(0) += 1;
        }
        let recent_errors = log.iter().filter(|r| r.timestamp > cutoff).count();

        let mut most_common: Vec<(ErrorKind, usize)> =
            errors_by_kind.iter().map(|(k, n)| (*k, *n)).collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        most_common.truncate(TOP_KINDS);

        ErrorStats {
            total_errors: log.len(),
            recent_errors,
            errors_by_kind,
            most_common,
            health_score: health_score(recent_errors),
        }
    }

    /// Newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.lock_log().iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock_log().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_log().is_empty()
    }
}

fn health_score(recent: usize) -> u8 {
    if recent > HEALTH_FLOOR_ERRORS {
        0
    } else {
        (100 - 2 * recent) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{CurrencyPair, Quote};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn setup(capacity: usize) -> (Arc<ManualClock>, FailureClassifier) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        ));
        let classifier = FailureClassifier::new(capacity, clock.clone());
        (clock, classifier)
    }

    fn network_error() -> MarketDataError {
        MarketDataError::Network {
            provider: "YAHOO".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn quote_request() -> Request {
        Request::Quote {
            symbol: "AAPL".to_string(),
        }
    }

    #[test]
    fn test_log_is_a_ring_buffer() {
        let (_, classifier) = setup(3);
        let ids: Vec<String> = (0..5)
            .map(|_| classifier.log_error(&network_error(), ErrorContext::new("quote")))
            .collect();

        assert_eq!(classifier.len(), 3);
        let kept: Vec<String> = classifier
            .recent_errors(10)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(kept, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
    }

    #[test]
    fn test_log_records_context_and_kind() {
        let (_, classifier) = setup(10);
        let context = ErrorContext::for_request(&Request::Historical {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::OneWeek,
        })
        .with_provider("IEX_CLOUD");
        let id = classifier.log_error(
            &MarketDataError::RateLimited {
                provider: "IEX_CLOUD".to_string(),
            },
            context,
        );

        let record = &classifier.recent_errors(1)[0];
        assert_eq!(record.id, id);
        assert_eq!(record.kind, ErrorKind::UpstreamRateLimited);
        assert_eq!(record.context.operation, "historical");
        assert_eq!(record.context.timeframe, Some(Timeframe::OneWeek));
        assert_eq!(record.context.provider.as_deref(), Some("IEX_CLOUD"));
    }

    #[test]
    fn test_symbol_not_found_is_terminal() {
        let (_, classifier) = setup(10);
        let cached = Quote::new("AAPL", dec!(150), "YAHOO", Utc::now());
        assert_eq!(
            classifier.fallback_for(
                ErrorKind::SymbolNotFound,
                &quote_request(),
                Some(cached.into())
            ),
            Fallback::Terminal
        );
    }

    #[test]
    fn test_cached_fallback_is_relabelled() {
        let (_, classifier) = setup(10);
        let cached = Quote::new("AAPL", dec!(150), "YAHOO", Utc::now());

        match classifier.fallback_for(ErrorKind::NetworkError, &quote_request(), Some(cached.into())) {
            Fallback::Data {
                payload: CachePayload::Quote(quote),
                freshness,
            } => {
                assert_eq!(freshness, Freshness::Fallback);
                assert_eq!(quote.price, dec!(150));
                assert_eq!(quote.source, CACHE_FALLBACK_SOURCE);
                assert!(!quote.is_default);
                assert!(quote.warning.is_some());
            }
            other => panic!("unexpected fallback: {:?}", other),
        }
    }

    #[test]
    fn test_default_when_nothing_cached() {
        let (_, classifier) = setup(10);
        for kind in [
            ErrorKind::NetworkError,
            ErrorKind::UpstreamRateLimited,
            ErrorKind::AuthError,
            ErrorKind::Timeout,
            ErrorKind::MalformedResponse,
            ErrorKind::Unknown,
        ] {
            match classifier.fallback_for(kind, &quote_request(), None) {
                Fallback::Data { payload, freshness } => {
                    assert_eq!(freshness, Freshness::Default);
                    assert!(payload.is_default());
                    assert!(!payload.warning().unwrap_or_default().is_empty());
                }
                Fallback::Terminal => panic!("{} must not be terminal", kind),
            }
        }
    }

    #[test]
    fn test_mismatched_cache_payload_is_ignored() {
        let (_, classifier) = setup(10);
        let cached = Quote::new("AAPL", dec!(150), "YAHOO", Utc::now());
        let request = Request::ExchangeRate {
            pair: CurrencyPair::new("EUR", "USD"),
        };

        match classifier.fallback_for(ErrorKind::Unknown, &request, Some(cached.into())) {
            Fallback::Data {
                payload: CachePayload::ExchangeRate(rate),
                freshness: Freshness::Default,
            } => assert_eq!(rate.rate, dec!(1.09)),
            other => panic!("unexpected fallback: {:?}", other),
        }
    }

    #[test]
    fn test_error_stats() {
        let (clock, classifier) = setup(100);
        assert_eq!(classifier.error_stats().health_score, 100);

        classifier.log_error(&network_error(), ErrorContext::new("quote"));
        clock.advance(std::time::Duration::from_secs(2 * 3600));
        for _ in 0..3 {
            classifier.log_error(
                &MarketDataError::RateLimited {
                    provider: "YAHOO".to_string(),
                },
                ErrorContext::new("quote"),
            );
        }
        classifier.log_error(
            &MarketDataError::SymbolNotFound("X".to_string()),
            ErrorContext::new("quote"),
        );

        let stats = classifier.error_stats();
        assert_eq!(stats.total_errors, 5);
        assert_eq!(stats.recent_errors, 4);
        assert_eq!(stats.health_score, 92);
        assert_eq!(stats.errors_by_kind[&ErrorKind::UpstreamRateLimited], 3);
        assert_eq!(
            stats.most_common[0],
            (ErrorKind::UpstreamRateLimited, 3)
        );
        assert_eq!(stats.most_common.len(), 3);

        classifier.clear();
        assert!(classifier.is_empty());
    }

    #[test]
    fn test_health_score_floor() {
        assert_eq!(health_score(0), 100);
        assert_eq!(health_score(10), 80);
        assert_eq!(health_score(50), 0);
        assert_eq!(health_score(51), 0);
    }
}
