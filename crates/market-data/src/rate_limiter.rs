//! Sliding-window admission control for outbound provider calls.
//!
//! Three independent windows are tracked: a short burst window, one minute
//! and one hour. Exceeding the minute or hour limit enters a fixed cooldown
//! during which every check fails. The burst limit only smooths spikes and
//! never triggers a cooldown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{duration_millis, Clock};
use crate::config::RateLimitConfig;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Admission {
    Admitted,
    Cooldown,
    BurstLimited,
    MinuteLimited,
    HourLimited,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Lifetime counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCounters {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub burst_blocked: u64,
    pub hourly_blocked: u64,
}

/// Read-only snapshot of window utilization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub requests_in_burst_window: usize,
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
    pub burst_limit: u32,
    pub max_per_minute: u32,
    pub max_per_hour: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_ms: u64,
    pub minute_usage_percent: f64,
    pub hour_usage_percent: f64,
    pub counters: RateLimitCounters,
}

#[derive(Debug)]
struct LimiterState {
    config: RateLimitConfig,
    burst: VecDeque<DateTime<Utc>>,
    minute: VecDeque<DateTime<Utc>>,
    hour: VecDeque<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    last_request: Option<DateTime<Utc>>,
    counters: RateLimitCounters,
}

fn ms(value: i64) -> chrono::Duration {
    chrono::Duration::milliseconds(value)
}

fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Entries still inside a window that started at `cutoff`.
fn live(window: &VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) -> impl Iterator<Item = &DateTime<Utc>> {
    window.iter().filter(move |t| **t > cutoff)
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    window.retain(|t| *t > cutoff);
}

impl LimiterState {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            burst: VecDeque::new(),
            minute: VecDeque::new(),
            hour: VecDeque::new(),
            cooldown_until: None,
            last_request: None,
            counters: RateLimitCounters::default(),
        }
    }

    fn burst_window(&self) -> chrono::Duration {
        ms(self.config.burst_window_ms as i64)
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> Admission {
        if let Some(until) = self.cooldown_until {
            if now < until {
                self.counters.blocked_requests += 1;
                return Admission::Cooldown;
            }
            self.cooldown_until = None;
            info!("Rate limiter: cooldown ended");
        }

        let burst_cutoff = now - self.burst_window();
        prune(&mut self.burst, burst_cutoff);
        prune(&mut self.minute, now - ms(MINUTE_MS));
        prune(&mut self.hour, now - ms(HOUR_MS));

        if self.burst.len() >= self.config.burst_limit as usize {
            self.counters.blocked_requests += 1;
            self.counters.burst_blocked += 1;
            debug!(
                "Rate limiter: burst limit of {} reached",
                self.config.burst_limit
            );
            return Admission::BurstLimited;
        }

        if self.minute.len() >= self.config.max_per_minute as usize {
            self.counters.blocked_requests += 1;
            self.enter_cooldown(now, "minute");
            return Admission::MinuteLimited;
        }

        if self.hour.len() >= self.config.max_per_hour as usize {
            self.counters.blocked_requests += 1;
            self.counters.hourly_blocked += 1;
            self.enter_cooldown(now, "hour");
            return Admission::HourLimited;
        }

        Admission::Admitted
    }

    fn enter_cooldown(&mut self, now: DateTime<Utc>, window: &str) {
        let until = now + ms(self.config.cooldown_ms as i64);
        self.cooldown_until = Some(until);
        info!(
            "Rate limiter: {} limit exceeded, cooling down until {}",
            window, until
        );
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.burst.push_back(now);
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.last_request = Some(now);
        self.counters.total_requests += 1;
    }

    fn optimal_delay(&self, now: DateTime<Utc>) -> Duration {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return to_std(until - now);
            }
        }

        let burst_window = self.burst_window();
        let mut burst = live(&self.burst, now - burst_window);
        if let Some(oldest) = burst.next() {
            if burst.count() + 1 >= self.config.burst_limit as usize {
                return to_std(*oldest + burst_window - now);
            }
        }

        let mut minute = live(&self.minute, now - ms(MINUTE_MS));
        let oldest_minute = minute.next().copied();
        let in_minute = oldest_minute.map_or(0, |_| minute.count() + 1);
        if let Some(oldest) = oldest_minute {
            if in_minute >= self.config.max_per_minute as usize {
                return to_std(oldest + ms(MINUTE_MS) - now);
            }
        }

        let mut hour = live(&self.hour, now - ms(HOUR_MS));
        if let Some(oldest) = hour.next() {
            if hour.count() + 1 >= self.config.max_per_hour as usize {
                return to_std(*oldest + ms(HOUR_MS) - now);
            }
        }

        if in_minute == 0 {
            return Duration::ZERO;
        }

        let spacing = ms(MINUTE_MS / self.config.max_per_minute.max(1) as i64);
        match self.last_request {
            Some(last) => to_std(spacing - (now - last)),
            None => Duration::ZERO,
        }
    }

    fn status(&self, now: DateTime<Utc>) -> RateLimitStatus {
        let in_burst = live(&self.burst, now - self.burst_window()).count();
        let in_minute = live(&self.minute, now - ms(MINUTE_MS)).count();
        let in_hour = live(&self.hour, now - ms(HOUR_MS)).count();
        let cooldown_remaining = self
            .cooldown_until
            .filter(|until| now < *until)
            .map(|until| to_std(until - now));

        RateLimitStatus {
            requests_in_burst_window: in_burst,
            requests_last_minute: in_minute,
            requests_last_hour: in_hour,
            burst_limit: self.config.burst_limit,
            max_per_minute: self.config.max_per_minute,
            max_per_hour: self.config.max_per_hour,
            in_cooldown: cooldown_remaining.is_some(),
            cooldown_remaining_ms: cooldown_remaining.map_or(0, duration_millis),
            minute_usage_percent: in_minute as f64 / self.config.max_per_minute.max(1) as f64
                * 100.0,
            hour_usage_percent: in_hour as f64 / self.config.max_per_hour.max(1) as f64 * 100.0,
            counters: self.counters.clone(),
        }
    }
}

/// Global admission control shared by every lookup.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LimiterState::new(config)),
            clock,
        }
    }

    /// Lock the limiter state, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Check whether a request may go out now without recording it.
    ///
    /// A rejection on the minute or hour window still starts the cooldown.
    pub fn can_make_request(&self) -> bool {
        let now = self.clock.now();
        self.lock_state().evaluate(now).is_admitted()
    }

    /// Record a request. Only call after an admitted check.
    pub fn record_request(&self) {
        let now = self.clock.now();
        self.lock_state().record(now);
    }

    /// Check and record under one lock, so no other decision interleaves.
    pub fn try_admit(&self) -> Admission {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let admission = state.evaluate(now);
        if admission.is_admitted() {
            state.record(now);
            debug!("Rate limiter: request admitted");
        }
        admission
    }

    /// How long to wait before the next request would likely be admitted.
    pub fn get_optimal_delay(&self) -> Duration {
        let now = self.clock.now();
        self.lock_state().optimal_delay(now)
    }

    /// Sleep for [`get_optimal_delay`](Self::get_optimal_delay). The lock is
    /// not held while sleeping.
    pub async fn wait_for_slot(&self) {
        let delay = self.get_optimal_delay();
        if !delay.is_zero() {
            debug!("Rate limiter: waiting {:?} for a slot", delay);
            tokio::time::sleep(delay).await;
        }
    }

    pub fn status(&self) -> RateLimitStatus {
        let now = self.clock.now();
        self.lock_state().status(now)
    }

    pub fn config(&self) -> RateLimitConfig {
        self.lock_state().config.clone()
    }

    /// Swap limits. Recorded windows are kept.
    pub fn update_config(&self, config: RateLimitConfig) {
        self.lock_state().config = config;
        info!("Rate limiter: configuration updated");
    }

    /// Forget every recorded request, the cooldown and the counters.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let config = state.config.clone();
        *state = LimiterState::new(config);
        info!("Rate limiter: reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        ))
    }

    fn config(burst: u32, per_minute: u32, per_hour: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_per_minute: per_minute,
            max_per_hour: per_hour,
            burst_limit: burst,
            burst_window_ms: 5_000,
            cooldown_ms: 60_000,
        }
    }

    #[test]
    fn test_minute_window_enters_cooldown_and_recovers() {
        let clock = clock();
        let limiter = RateLimiter::new(config(100, 5, 100), clock.clone());

        for _ in 0..5 {
            assert_eq!(limiter.try_admit(), Admission::Admitted);
            clock.advance(Duration::from_secs(1));
        }

        assert!(!limiter.can_make_request());
        let status = limiter.status();
        assert!(status.in_cooldown);
        assert_eq!(status.cooldown_remaining_ms, 60_000);

        clock.advance(Duration::from_secs(59));
        assert_eq!(limiter.try_admit(), Admission::Cooldown);

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.try_admit(), Admission::Admitted);
    }

    #[test]
    fn test_burst_blocks_without_cooldown() {
        let clock = clock();
        let limiter = RateLimiter::new(config(3, 60, 1_000), clock.clone());

        for _ in 0..3 {
            assert!(limiter.try_admit().is_admitted());
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(limiter.try_admit(), Admission::BurstLimited);
        assert!(!limiter.status().in_cooldown);
        assert_eq!(limiter.get_optimal_delay(), Duration::from_secs(2));

        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.try_admit(), Admission::Admitted);
        assert_eq!(limiter.status().counters.burst_blocked, 1);
    }

    #[test]
    fn test_hour_window() {
        let clock = clock();
        let limiter = RateLimiter::new(config(100, 100, 3), clock.clone());

        for _ in 0..3 {
            assert!(limiter.try_admit().is_admitted());
        }
        assert_eq!(limiter.try_admit(), Admission::HourLimited);

        let counters = limiter.status().counters;
        assert_eq!(counters.total_requests, 3);
        assert_eq!(counters.blocked_requests, 1);
        assert_eq!(counters.hourly_blocked, 1);
    }

    #[test]
    fn test_check_without_record_does_not_consume() {
        let limiter = RateLimiter::new(config(1, 60, 1_000), clock());

        assert!(limiter.can_make_request());
        assert!(limiter.can_make_request());
        assert_eq!(limiter.status().requests_last_minute, 0);

        limiter.record_request();
        assert!(!limiter.can_make_request());
    }

    #[test]
    fn test_optimal_delay_spacing_and_cooldown() {
        let clock = clock();
        let limiter = RateLimiter::new(config(100, 60, 1_000), clock.clone());
        assert_eq!(limiter.get_optimal_delay(), Duration::ZERO);

        limiter.try_admit();
        clock.advance(Duration::from_millis(400));
        assert_eq!(limiter.get_optimal_delay(), Duration::from_millis(600));

        clock.advance(Duration::from_secs(5));
        assert_eq!(limiter.get_optimal_delay(), Duration::ZERO);

        let limiter = RateLimiter::new(config(100, 1, 1_000), clock.clone());
        limiter.try_admit();
        assert_eq!(limiter.try_admit(), Admission::MinuteLimited);
        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.get_optimal_delay(), Duration::from_secs(50));
    }

    #[test]
    fn test_status_is_side_effect_free() {
        let clock = clock();
        let limiter = RateLimiter::new(config(100, 60, 1_000), clock.clone());
        limiter.try_admit();
        limiter.try_admit();

        let first = limiter.status();
        let second = limiter.status();
        assert_eq!(first, second);
        assert_eq!(first.requests_last_minute, 2);
        assert!((first.minute_usage_percent - 3.333).abs() < 0.01);
    }

    #[test]
    fn test_reset_and_update_config() {
        let clock = clock();
        let limiter = RateLimiter::new(config(1, 60, 1_000), clock);
        limiter.try_admit();
        assert!(!limiter.can_make_request());

        limiter.update_config(config(2, 60, 1_000));
        assert!(limiter.can_make_request());

        limiter.reset();
        assert_eq!(limiter.status().counters, RateLimitCounters::default());
        assert_eq!(limiter.config().burst_limit, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_sleeps_for_the_delay() {
        let clock = clock();
        let limiter = RateLimiter::new(config(100, 1, 1_000), clock);
        limiter.try_admit();
        limiter.try_admit();

        let started = tokio::time::Instant::now();
        limiter.wait_for_slot().await;
        assert!(started.elapsed() >= Duration::from_secs(60));
    }
}
