//! Property tests for the ordering and admission invariants.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use marketgate_market_data::{
    HistoricalSeries, ManualClock, PricePoint, RateLimitConfig, RateLimiter, Timeframe,
};

proptest! {
    #[test]
    fn series_is_strictly_ascending_and_capped(
        offsets in prop::collection::vec(0i64..2_000, 0..200),
        cap in 1usize..120,
    ) {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let points: Vec<PricePoint> = offsets
            .iter()
            .map(|h| PricePoint::flat(base + chrono::Duration::hours(*h), Decimal::from(*h)))
            .collect();

        let series = HistoricalSeries::normalize("AAPL", Timeframe::OneYear, points, cap, "T");

        prop_assert!(series.is_strictly_ascending());
        prop_assert!(series.prices.len() <= cap);

        let mut distinct = offsets.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(series.prices.len(), distinct.len().min(cap));

        // The most recent points are the ones kept
        if let Some(last) = distinct.last() {
            prop_assert_eq!(series.last_close(), Some(Decimal::from(*last)));
        }
    }

    #[test]
    fn limiter_never_over_admits(
        steps in prop::collection::vec(0u64..4_000, 1..300),
        max_per_minute in 1u32..30,
        burst_limit in 1u32..10,
    ) {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let limiter = RateLimiter::new(
            RateLimitConfig {
                max_per_minute,
                max_per_hour: 10_000,
                burst_limit,
                burst_window_ms: 5_000,
                cooldown_ms: 10_000,
            },
            clock.clone(),
        );

        let mut admitted = Vec::new();
        let mut elapsed_ms: i64 = 0;
        for step in steps {
            clock.advance(Duration::from_millis(step));
            elapsed_ms += step as i64;

            if limiter.try_admit().is_admitted() {
                admitted.push(elapsed_ms);
                let in_minute = admitted.iter().filter(|t| elapsed_ms - **t < 60_000).count();
                let in_burst = admitted.iter().filter(|t| elapsed_ms - **t < 5_000).count();
                prop_assert!(in_minute <= max_per_minute as usize);
                prop_assert!(in_burst <= burst_limit as usize);
            }
        }
    }
}
