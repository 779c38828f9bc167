#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use outage_mock::lib_mem::split_target;
use outage_mock::RampSchedule;
use proptest::prelude::*;
use tokio::time::Instant;

fn ramp(rampup_ms: u64) -> RampSchedule {
    RampSchedule::new(Instant::now(), Duration::from_millis(rampup_ms))
}

#[test]
fn scenario_file_halfway() {
    let r = ramp(10_000);
    assert_eq!(r.target_mb_at(50, Duration::from_secs(5)), 25);
    assert_eq!(r.target_mb_at(50, Duration::from_secs(10)), 50);
    assert_eq!(r.target_mb_at(50, Duration::from_secs(11)), 50);
}

proptest! {
    #[test]
    fn exact_after_rampup(rampup in 0u64..100_000, extra in 0u64..100_000, target in 0u64..1_000_000) {
        let r = ramp(rampup);
        let elapsed = Duration::from_millis(rampup + extra);
        prop_assert_eq!(r.target_mb_at(target, elapsed), target);
        prop_assert!((r.progress_at(elapsed) - 1.0).abs() < f64::EPSILON);
        let percent = f64::from(u32::try_from(target % 101).unwrap_or(0));
        prop_assert!((r.target_percent_at(percent, elapsed) - percent).abs() < f64::EPSILON);
    }

    #[test]
    fn starts_at_zero(rampup in 1u64..100_000, target in 0u64..1_000_000) {
        let r = ramp(rampup);
        prop_assert_eq!(r.target_mb_at(target, Duration::ZERO), 0);
        prop_assert!(r.target_percent_at(80.0, Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn non_decreasing(rampup in 1u64..100_000, a in 0u64..200_000, b in 0u64..200_000, target in 0u64..1_000_000) {
        let r = ramp(rampup);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (lo, hi) = (Duration::from_millis(lo), Duration::from_millis(hi));
        prop_assert!(r.target_mb_at(target, lo) <= r.target_mb_at(target, hi));
        prop_assert!(r.target_mb_at(target, hi) <= target);
        prop_assert!(r.target_percent_at(100.0, lo) <= r.target_percent_at(100.0, hi));
    }

    #[test]
    fn split_sums_exactly(total in 0u64..1_000_000, workers in 1usize..512) {
        let shares = split_target(total, workers);
        prop_assert_eq!(shares.len(), workers);
        prop_assert_eq!(shares.iter().sum::<u64>(), total);
        let max = shares.iter().copied().max().unwrap_or(0);
        let min = shares.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
    }
}
