use coupon_dispenser::claim_cookie::ClaimCookie;
use coupon_dispenser::coupons::CouponPool;
use coupon_dispenser::service::{
    ClaimOutcome, ClaimService, Restriction, RestrictionReason, Status,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const WINDOW: u64 = 3600;
const T0: i64 = 1_700_000_000;

fn service(codes: &[&str]) -> ClaimService {
    let pool = CouponPool::new(codes.iter().map(|c| c.to_string()).collect()).unwrap();
    ClaimService::new(pool, WINDOW)
}

fn issued(outcome: ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::Issued(claim) => claim.coupon,
        ClaimOutcome::Restricted(r) => panic!("expected a coupon, got {r:?}"),
    }
}

fn restricted(outcome: ClaimOutcome) -> Restriction {
    match outcome {
        ClaimOutcome::Restricted(r) => r,
        ClaimOutcome::Issued(c) => panic!("expected a restriction, got {c:?}"),
    }
}

fn cookie_at(timestamp: i64) -> String {
    ClaimCookie {
        timestamp,
        coupon: "A".to_string(),
    }
    .to_value()
}

#[test]
fn distinct_clients_receive_codes_in_pool_order() {
    let svc = service(&["A", "B", "C", "D"]);
    let got: Vec<_> = (0..3)
        .map(|i| issued(svc.claim_at(&format!("10.0.0.{i}"), None, T0)))
        .collect();
    assert_eq!(got, ["A", "B", "C"]);
    assert_eq!(svc.cursor(), 3);
}

#[test]
fn rotation_wraps_after_pool_is_exhausted() {
    let svc = service(&["A", "B", "C"]);
    let first = issued(svc.claim_at("ip-0", None, T0));
    for i in 1..3 {
        issued(svc.claim_at(&format!("ip-{i}"), None, T0));
    }
    assert_eq!(issued(svc.claim_at("ip-3", None, T0)), first);
}

#[test]
fn repeat_claim_from_same_ip_is_restricted() {
    let svc = service(&["A", "B"]);
    issued(svc.claim_at("1.1.1.1", None, T0));

    let r = restricted(svc.claim_at("1.1.1.1", None, T0 + 10));
    assert_eq!(r.reason, RestrictionReason::Ip);
    assert_eq!(r.time_left, WINDOW - 10);
    assert!(r.time_left > 0 && r.time_left < WINDOW);
    assert_eq!(r.message(), "Your IP recently claimed a coupon");
}

#[test]
fn valid_cookie_restricts_an_unknown_ip() {
    let svc = service(&["A", "B"]);
    let cookie = cookie_at(T0 - 100);

    let r = restricted(svc.claim_at("fresh-ip", Some(&cookie), T0));
    assert_eq!(r.reason, RestrictionReason::Cookie);
    assert_eq!(r.time_left, WINDOW - 100);
    assert_eq!(r.message(), "You recently claimed a coupon");
    assert_eq!(svc.tracked_ips(), 0);
}

#[test]
fn cookie_check_takes_precedence_over_ip_check() {
    let svc = service(&["A", "B"]);
    issued(svc.claim_at("2.2.2.2", None, T0));
    let cookie = cookie_at(T0 - 500);

    let r = restricted(svc.claim_at("2.2.2.2", Some(&cookie), T0 + 1));
    assert_eq!(r.reason, RestrictionReason::Cookie);
    assert_eq!(r.time_left, WINDOW - 501);
}

#[test]
fn expired_cookie_falls_through_to_ip_check() {
    let svc = service(&["A", "B"]);
    issued(svc.claim_at("3.3.3.3", None, T0));
    let stale = cookie_at(T0 - 2 * WINDOW as i64);

    let r = restricted(svc.claim_at("3.3.3.3", Some(&stale), T0 + 5));
    assert_eq!(r.reason, RestrictionReason::Ip);
}

#[test]
fn restriction_lifts_exactly_at_window_boundary() {
    let svc = service(&["A", "B"]);
    issued(svc.claim_at("4.4.4.4", None, T0));

    let end = T0 + WINDOW as i64;
    assert_eq!(restricted(svc.claim_at("4.4.4.4", None, end - 1)).time_left, 1);
    assert_eq!(issued(svc.claim_at("4.4.4.4", None, end)), "B");
}

#[test]
fn cookie_restriction_lifts_exactly_at_window_boundary() {
    let svc = service(&["A"]);
    let cookie = cookie_at(T0);
    let end = T0 + WINDOW as i64;
    assert!(matches!(
        svc.check_status_at("x", Some(&cookie), end - 1),
        Status::Restricted(_)
    ));
    assert_eq!(svc.check_status_at("x", Some(&cookie), end), Status::Unrestricted);
}

#[test]
fn future_dated_cookie_restricts_beyond_the_window() {
    let svc = service(&["A"]);
    let cookie = cookie_at(T0 + 10_000);

    let r = restricted(svc.claim_at("x", Some(&cookie), T0));
    assert_eq!(r.reason, RestrictionReason::Cookie);
    assert_eq!(r.time_left, WINDOW + 10_000);
}

#[test]
fn numeric_string_and_float_cookie_timestamps_restrict() {
    let svc = service(&["A"]);
    let as_string = format!(r#"{{"timestamp":"{}","coupon":"A"}}"#, T0 - 100);
    let as_float = format!(r#"{{"timestamp":{}.0,"coupon":"A"}}"#, T0 - 100);

    for cookie in [as_string, as_float] {
        let r = restricted(svc.claim_at("y", Some(&cookie), T0));
        assert_eq!(r.reason, RestrictionReason::Cookie);
        assert_eq!(r.time_left, WINDOW - 100);
    }
    assert_eq!(svc.cursor(), 0);
}

#[test]
fn rejected_claim_does_not_advance_rotation() {
    let svc = service(&["A", "B", "C"]);
    issued(svc.claim_at("5.5.5.5", None, T0));
    restricted(svc.claim_at("5.5.5.5", None, T0 + 1));
    restricted(svc.claim_at("other", Some(&cookie_at(T0)), T0 + 1));

    assert_eq!(svc.cursor(), 1);
    assert_eq!(issued(svc.claim_at("6.6.6.6", None, T0 + 2)), "B");
}

#[test]
fn malformed_cookie_is_treated_as_absent() {
    let svc = service(&["A", "B"]);
    for garbage in ["{", "null", "{\"timestamp\":\"x\"}", "%%%"] {
        assert_eq!(
            svc.check_status_at("7.7.7.7", Some(garbage), T0),
            Status::Unrestricted
        );
    }
    assert_eq!(issued(svc.claim_at("7.7.7.7", Some("{"), T0)), "A");
    assert!(matches!(
        svc.check_status_at("7.7.7.7", Some("{"), T0),
        Status::Restricted(Restriction {
            reason: RestrictionReason::Ip,
            ..
        })
    ));
}

#[test]
fn status_check_has_no_side_effects() {
    let svc = service(&["A", "B"]);
    for _ in 0..5 {
        assert_eq!(svc.check_status_at("8.8.8.8", None, T0), Status::Unrestricted);
    }
    assert_eq!(svc.cursor(), 0);
    assert_eq!(svc.tracked_ips(), 0);
}

#[test]
fn missing_ip_shares_one_bucket() {
    let svc = service(&["A", "B"]);
    issued(svc.claim_at("", None, T0));
    assert_eq!(
        restricted(svc.claim_at("", None, T0 + 1)).reason,
        RestrictionReason::Ip
    );
}

#[test]
fn claim_reports_window_and_cookie_payload() {
    let svc = service(&["A"]);
    match svc.claim_at("9.9.9.9", None, T0) {
        ClaimOutcome::Issued(claim) => {
            assert_eq!(claim.restriction_window, WINDOW);
            assert_eq!(claim.timestamp, T0);
            let payload: serde_json::Value =
                serde_json::from_str(&claim.cookie().to_value()).unwrap();
            assert_eq!(payload, serde_json::json!({ "timestamp": T0, "coupon": "A" }));
            assert_eq!(ClaimCookie::issued_at(&claim.cookie().to_value()), Some(T0 as f64));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn concurrent_claims_from_distinct_ips_never_share_a_code() {
    let codes: Vec<String> = (0..64).map(|i| format!("CODE{i}")).collect();
    let svc = Arc::new(ClaimService::new(CouponPool::new(codes).unwrap(), WINDOW));

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || issued(svc.claim_at(&format!("10.1.0.{i}"), None, T0)))
        })
        .collect();
    let got: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(got.len(), 64);
    assert_eq!(svc.cursor(), 0);
    assert_eq!(svc.tracked_ips(), 64);
}

#[test]
fn concurrent_claims_from_one_ip_succeed_once() {
    let svc = Arc::new(service(&["A", "B", "C"]));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || svc.claim_at("11.11.11.11", None, T0))
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| matches!(o, ClaimOutcome::Issued(_)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(svc.cursor(), 1);
}

#[test]
fn bounded_service_forgets_oldest_ips() {
    let pool = CouponPool::new(vec!["A".into(), "B".into()]).unwrap();
    let svc = ClaimService::bounded(pool, WINDOW, 2);
    issued(svc.claim_at("a", None, T0));
    issued(svc.claim_at("b", None, T0 + 1));
    issued(svc.claim_at("c", None, T0 + 2));

    assert_eq!(svc.tracked_ips(), 2);
    assert_eq!(svc.check_status_at("a", None, T0 + 3), Status::Unrestricted);
}
