//! Per-adapter health counters and availability gate.
//!
//! Counters are monotonic atomics. The gate closes once the error count
//! exceeds the adapter's threshold without a single success. After
//! `recovery_timeout` since the last error a closed gate lets exactly one
//! probe through: a success re-opens it for good, a failure restarts the
//! timer. A probe abandoned before it reports back gives the slot back when
//! its [`CallGuard`] drops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::duration_millis;

/// Default time an unavailable adapter waits before a recovery probe.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Availability as seen from outside, without side effects.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AvailabilityState {
    Available,
    Unavailable,
    /// Recovery timeout elapsed; the next call is a probe
    Probing,
}

#[derive(Debug, Default)]
struct LastError {
    at: Option<Instant>,
    at_wall: Option<DateTime<Utc>>,
    message: Option<String>,
}

/// Point-in-time copy of [`ProviderStats`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub average_latency_ms: f64,
    /// Successes as a percentage of completed requests
    pub success_rate: f64,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub state: AvailabilityState,
}

/// Health and latency accounting for one adapter.
#[derive(Debug)]
pub struct ProviderStats {
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    total_latency_ms: AtomicU64,
    latency_samples: AtomicU64,
    probe_in_flight: AtomicBool,
    last_error: Mutex<LastError>,
    error_threshold: u64,
    recovery_timeout: Duration,
}

impl ProviderStats {
    pub fn new(error_threshold: u64) -> Self {
        Self::with_recovery_timeout(error_threshold, DEFAULT_RECOVERY_TIMEOUT)
    }

    pub fn with_recovery_timeout(error_threshold: u64, recovery_timeout: Duration) -> Self {
        Self {
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            last_error: Mutex::new(LastError::default()),
            error_threshold,
            recovery_timeout,
        }
    }

    fn lock_last_error(&self) -> MutexGuard<'_, LastError> {
        self.last_error.lock().unwrap_or_else(|poisoned| {
            warn!("Provider stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn tripped(&self) -> bool {
        self.successes.load(Ordering::Acquire) == 0
            && self.errors.load(Ordering::Acquire) > self.error_threshold
    }

    fn recovery_due(&self) -> bool {
        self.lock_last_error()
            .at
            .map(|at| at.elapsed() >= self.recovery_timeout)
            .unwrap_or(true)
    }

    /// Read-only view of the gate.
    pub fn state(&self) -> AvailabilityState {
        if !self.tripped() {
            AvailabilityState::Available
        } else if self.recovery_due() && !self.probe_in_flight.load(Ordering::Acquire) {
            AvailabilityState::Probing
        } else {
            AvailabilityState::Unavailable
        }
    }

    /// Whether a call may go out now.
    ///
    /// When the recovery timeout has elapsed this claims the single probe
    /// slot, so only one concurrent caller gets `true`.
    pub fn is_available(&self, configured: bool) -> bool {
        if !configured {
            return false;
        }
        if !self.tripped() {
            return true;
        }
        if !self.recovery_due() {
            return false;
        }
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Track the call about to go out after [`is_available`](Self::is_available).
    ///
    /// Finish it with [`CallGuard::success`] or [`CallGuard::failure`].
    /// Dropping it unfinished releases a probe slot this call was holding.
    /// The request itself is counted by [`record_request`](Self::record_request).
    pub fn begin_call(&self) -> CallGuard<'_> {
        CallGuard {
            stats: self,
            holds_probe: self.tripped() && self.probe_in_flight.load(Ordering::Acquire),
            finished: false,
        }
    }

    /// Count an outgoing call.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_success(&self, latency: Duration) {
        let was_tripped = self.tripped();
        self.successes.fetch_add(1, Ordering::AcqRel);
        self.record_latency(latency);
        if self.probe_in_flight.swap(false, Ordering::AcqRel) || was_tripped {
            info!("Provider recovered after {} errors", self.errors());
        }
    }

    pub fn record_failure(&self, message: &str, latency: Duration) {
        self.errors.fetch_add(1, Ordering::AcqRel);
        self.record_latency(latency);
        {
            let mut last = self.lock_last_error();
            last.at = Some(Instant::now());
            last.at_wall = Some(Utc::now());
            last.message = Some(message.to_string());
        }
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn record_latency(&self, latency: Duration) {
        self.total_latency_ms
            .fetch_add(duration_millis(latency), Ordering::AcqRel);
        self.latency_samples.fetch_add(1, Ordering::AcqRel);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn average_latency_ms(&self) -> f64 {
        let samples = self.latency_samples.load(Ordering::Acquire);
        if samples == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Acquire) as f64 / samples as f64
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        let successes = self.successes();
        let errors = self.errors();
        let completed = successes + errors;
        let last = self.lock_last_error();
        let (last_error_at, last_error) = (last.at_wall, last.message.clone());
        drop(last);

        ProviderStatsSnapshot {
            requests: self.requests(),
            successes,
            errors,
            average_latency_ms: self.average_latency_ms(),
            success_rate: if completed == 0 {
                0.0
            } else {
                successes as f64 / completed as f64 * 100.0
            },
            last_error_at,
            last_error,
            state: self.state(),
        }
    }
}

/// One in-flight adapter call. See [`ProviderStats::begin_call`].
#[must_use = "an unfinished call records nothing"]
#[derive(Debug)]
pub struct CallGuard<'a> {
    stats: &'a ProviderStats,
    holds_probe: bool,
    finished: bool,
}

impl CallGuard<'_> {
    pub fn success(mut self, latency: Duration) {
        self.finished = true;
        self.stats.record_success(latency);
    }

    pub fn failure(mut self, message: &str, latency: Duration) {
        self.finished = true;
        self.stats.record_failure(message, latency);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished && self.holds_probe {
            self.stats.probe_in_flight.store(false, Ordering::Release);
            debug!("Recovery probe abandoned before completing, slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(stats: &ProviderStats, times: usize) {
        for _ in 0..times {
            stats.record_request();
            stats.record_failure("boom", Duration::from_millis(10));
        }
    }

    #[test]
    fn test_trips_only_without_successes() {
        let stats = ProviderStats::new(2);
        fail(&stats, 2);
        assert!(stats.is_available(true));
        fail(&stats, 1);
        assert!(!stats.is_available(true));
        assert_eq!(stats.state(), AvailabilityState::Unavailable);

        let healthy = ProviderStats::new(2);
        healthy.record_success(Duration::from_millis(5));
        fail(&healthy, 10);
        assert!(healthy.is_available(true));
    }

    #[test]
    fn test_unconfigured_is_unavailable() {
        let stats = ProviderStats::new(5);
        assert!(!stats.is_available(false));
    }

    #[test]
    fn test_half_open_allows_a_single_probe() {
        let stats = ProviderStats::with_recovery_timeout(1, Duration::ZERO);
        fail(&stats, 2);

        assert_eq!(stats.state(), AvailabilityState::Probing);
        assert!(stats.is_available(true));
        assert!(!stats.is_available(true));

        stats.record_failure("still down", Duration::from_millis(1));
        assert!(stats.is_available(true));

        stats.record_success(Duration::from_millis(1));
        assert_eq!(stats.state(), AvailabilityState::Available);
        assert!(stats.is_available(true));
        assert!(stats.is_available(true));
    }

    #[test]
    fn test_snapshot_latency_and_rate() {
        let stats = ProviderStats::new(5);
        stats.record_request();
        stats.record_success(Duration::from_millis(100));
        stats.record_request();
        stats.record_failure("timeout", Duration::from_millis(300));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.average_latency_ms, 200.0);
        assert_eq!(snapshot.success_rate, 50.0);
        assert_eq!(snapshot.last_error.as_deref(), Some("timeout"));
        assert!(snapshot.last_error_at.is_some());
    }

    #[test]
    fn test_abandoned_probe_releases_the_slot() {
        let stats = ProviderStats::with_recovery_timeout(1, Duration::ZERO);
        fail(&stats, 2);

        assert!(stats.is_available(true));
        let call = stats.begin_call();
        assert!(!stats.is_available(true));
        assert_eq!(stats.state(), AvailabilityState::Unavailable);

        // Caller went away mid-call
        drop(call);
        assert_eq!(stats.state(), AvailabilityState::Probing);
        assert!(stats.is_available(true));

        // The new probe still completes normally
        stats.begin_call().success(Duration::from_millis(1));
        assert_eq!(stats.state(), AvailabilityState::Available);
    }

    #[test]
    fn test_finished_or_healthy_calls_leave_the_probe_alone() {
        let stats = ProviderStats::with_recovery_timeout(1, Duration::ZERO);
        fail(&stats, 2);
        assert!(stats.is_available(true));
        stats.begin_call().failure("still down", Duration::from_millis(1));
        assert!(stats.is_available(true));

        // A call that started before the gate closed holds no probe slot
        let healthy = ProviderStats::with_recovery_timeout(1, Duration::ZERO);
        let early = healthy.begin_call();
        fail(&healthy, 2);
        assert!(healthy.is_available(true));
        drop(early);
        assert!(!healthy.is_available(true));
    }
}
