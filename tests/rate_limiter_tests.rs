/// Fixed-window limiter scenarios driven with explicit instants.
use cargenie_api::rate_limiter::{RateLimitConfig, RateLimitDecision, RateLimiter};
use proptest::prelude::*;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

fn limiter(max: u32, window: Duration) -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        window,
        max: NonZeroU32::new(max).unwrap(),
        message: "Too many requests".to_string(),
    })
}

#[test]
fn test_five_per_minute_scenario() {
    let limiter = limiter(5, Duration::from_secs(60));
    let t0 = Instant::now();

    for i in 0..5 {
        assert!(
            limiter.check_at("1.2.3.4", t0 + Duration::from_secs(i)).is_allowed(),
            "request {} should pass",
            i + 1
        );
    }

    assert_eq!(
        limiter.check_at("1.2.3.4", t0 + Duration::from_secs(10)),
        RateLimitDecision::Rejected {
            retry_after_secs: 50
        }
    );

    // The window is anchored on the first request, not the last.
    let t1 = t0 + Duration::from_secs(60);
    assert!(limiter.check_at("1.2.3.4", t1).is_allowed());

    // The new window starts counting from one again.
    for i in 1..5 {
        assert!(
            limiter.check_at("1.2.3.4", t1 + Duration::from_secs(i)).is_allowed(),
            "request {} of the new window should pass",
            i + 1
        );
    }
    assert_eq!(
        limiter.check_at("1.2.3.4", t1 + Duration::from_secs(5)),
        RateLimitDecision::Rejected {
            retry_after_secs: 55
        }
    );
}

#[test]
fn test_keys_are_independent() {
    let limiter = limiter(1, Duration::from_secs(60));
    let t0 = Instant::now();

    assert!(limiter.check_at("a", t0).is_allowed());
    assert!(!limiter.check_at("a", t0).is_allowed());
    assert!(limiter.check_at("b", t0).is_allowed());
}

#[test]
fn test_rejected_requests_do_not_extend_window() {
    let limiter = limiter(2, Duration::from_secs(30));
    let t0 = Instant::now();

    limiter.check_at("k", t0);
    limiter.check_at("k", t0);
    for offset in [5, 10, 20, 29] {
        assert!(!limiter
            .check_at("k", t0 + Duration::from_secs(offset))
            .is_allowed());
    }
    assert!(limiter
        .check_at("k", t0 + Duration::from_secs(30))
        .is_allowed());
}

proptest! {
    #[test]
    fn exactly_max_requests_pass_per_window(max in 1u32..20, extra in 1u32..20, window_secs in 1u64..3600) {
        let window = Duration::from_secs(window_secs);
        let limiter = limiter(max, window);
        let t0 = Instant::now();

        let allowed = (0..max + extra)
            .filter(|_| limiter.check_at("client", t0).is_allowed())
            .count();
        prop_assert_eq!(allowed as u32, max);
    }

    #[test]
    fn retry_after_is_within_window(
        window_secs in 1u64..3600,
        fraction in 0.0f64..1.0
    ) {
        let window = Duration::from_secs(window_secs);
        let elapsed_ms = ((window_secs * 1000) as f64 * fraction) as u64;
        let limiter = limiter(1, window);
        let t0 = Instant::now();

        limiter.check_at("client", t0);
        match limiter.check_at("client", t0 + Duration::from_millis(elapsed_ms)) {
            RateLimitDecision::Rejected { retry_after_secs } => {
                prop_assert!(retry_after_secs >= 1);
                prop_assert!(retry_after_secs <= window_secs);
            }
            RateLimitDecision::Allowed => prop_assert!(false, "second request inside window passed"),
        }
    }
}
