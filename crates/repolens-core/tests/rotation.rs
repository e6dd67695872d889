//! Key rotation behaviour through the public API.

use std::sync::Arc;

use chrono::Duration;
use repolens_core::clock::ManualClock;
use repolens_core::error::UpstreamError;
use repolens_core::keyring::{CredentialOrigin, FailureKind, KeyRotationManager};

fn manager(keys: &[&str], fallback: Option<&str>) -> (Arc<ManualClock>, KeyRotationManager) {
    let clock = Arc::new(ManualClock::at_epoch());
    let mgr = KeyRotationManager::new(
        keys.iter().map(|k| k.to_string()).collect(),
        fallback.map(String::from),
    )
    .with_clock(clock.clone());
    (clock, mgr)
}

#[test]
fn test_pool_with_fallback_survives_rate_limit() {
    let (_clock, mgr) = manager(&["K1", "K2"], Some("KF"));

    let first = mgr.acquire().unwrap();
    assert_eq!(first.secret(), "K1");
    assert_eq!(first.origin(), CredentialOrigin::Pool(0));

    let second = mgr.acquire().unwrap();
    assert_eq!(second.secret(), "K2");

    mgr.report(&first, FailureKind::RateLimited);

    // K1 is cooling down and K2 was used moments ago.
    let third = mgr.acquire().unwrap();
    assert_eq!(third.secret(), "KF");
    assert!(third.is_fallback());
}

#[test]
fn test_size_one_pool_exhausts_within_throttle() {
    let (clock, mgr) = manager(&["solo"], None);
    assert!(mgr.acquire().is_ok());
    clock.advance(Duration::milliseconds(10));
    assert_eq!(mgr.acquire().unwrap_err(), UpstreamError::QuotaExhausted);
}

#[test]
fn test_custom_cooldown_and_throttle() {
    let (clock, mgr) = manager(&["a", "b"], None);
    let mgr = mgr
        .with_cooldown(Duration::seconds(5))
        .with_throttle(Duration::milliseconds(100));

    mgr.report_failure("a", Some(FailureKind::RateLimited));
    assert_eq!(mgr.acquire().unwrap().secret(), "b");
    clock.advance(Duration::milliseconds(100));
    assert_eq!(mgr.acquire().unwrap().secret(), "b");

    clock.advance(Duration::seconds(5));
    assert_eq!(mgr.acquire().unwrap().secret(), "a");
}

#[test]
fn test_shared_across_threads_hands_out_distinct_keys() {
    let (_clock, mgr) = manager(&["a", "b", "c", "d"], None);
    let mgr = Arc::new(mgr);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            std::thread::spawn(move || mgr.acquire().unwrap().secret().to_string())
        })
        .collect();

    let mut issued: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    issued.sort();
    assert_eq!(issued, vec!["a", "b", "c", "d"]);
    assert_eq!(mgr.acquire().unwrap_err(), UpstreamError::QuotaExhausted);
}
