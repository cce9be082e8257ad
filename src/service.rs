use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::claim_cookie::{self, ClaimCookie};
use crate::coupons::{CouponPool, Rotation};
use crate::rate_limiter::{ClaimRecord, RateLimiter};

pub const DEFAULT_RESTRICTION_WINDOW_SECONDS: u64 = 3600;

/// Which signal caused a client to be turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionReason {
    Cookie,
    Ip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub reason: RestrictionReason,
    pub time_left: u64,
}

impl Restriction {
    pub fn message(&self) -> &'static str {
        match self.reason {
            RestrictionReason::Cookie => "You recently claimed a coupon",
            RestrictionReason::Ip => "Your IP recently claimed a coupon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Unrestricted,
    Restricted(Restriction),
}

/// A granted claim. `timestamp` is what goes into both the IP ledger and the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub coupon: String,
    pub timestamp: i64,
    pub restriction_window: u64,
}

impl Claim {
    pub fn cookie(&self) -> ClaimCookie {
        ClaimCookie {
            timestamp: self.timestamp,
            coupon: self.coupon.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Issued(Claim),
    Restricted(Restriction),
}

struct ClaimState {
    rotation: Rotation,
    ledger: RateLimiter,
}

/// Hands out coupons round-robin, at most one per client per restriction window.
///
/// A client is identified twice over: by its IP, remembered server-side, and by
/// the claim cookie it presents. Either one still inside the window restricts it.
pub struct ClaimService {
    pool: CouponPool,
    window: u64,
    state: Mutex<ClaimState>,
}

impl ClaimService {
    pub fn new(pool: CouponPool, window: u64) -> Self {
        Self::with_ledger(pool, RateLimiter::new(window))
    }

    /// Like [`ClaimService::new`] but forgets the oldest IPs beyond `max_tracked_ips`.
    pub fn bounded(pool: CouponPool, window: u64, max_tracked_ips: usize) -> Self {
        Self::with_ledger(pool, RateLimiter::bounded(window, max_tracked_ips))
    }

    fn with_ledger(pool: CouponPool, ledger: RateLimiter) -> Self {
        Self {
            pool,
            window: ledger.window(),
            state: Mutex::new(ClaimState {
                rotation: Rotation::new(),
                ledger,
            }),
        }
    }

    pub fn cursor(&self) -> usize {
        self.lock().rotation.position()
    }

    pub fn tracked_ips(&self) -> usize {
        self.lock().ledger.len()
    }

    pub fn check_status(&self, ip: &str, cookie: Option<&str>) -> Status {
        self.check_status_at(ip, cookie, unix_now())
    }

    pub fn check_status_at(&self, ip: &str, cookie: Option<&str>, now: i64) -> Status {
        let state = self.lock();
        match self.restriction(&state, ip, cookie, now) {
            Some(restriction) => Status::Restricted(restriction),
            None => Status::Unrestricted,
        }
    }

    pub fn claim(&self, ip: &str, cookie: Option<&str>) -> ClaimOutcome {
        self.claim_at(ip, cookie, unix_now())
    }

    /// Check, issue, advance and record all happen under one guard so concurrent
    /// claims never share a cursor value or slip past each other's restriction.
    pub fn claim_at(&self, ip: &str, cookie: Option<&str>, now: i64) -> ClaimOutcome {
        let mut state = self.lock();
        if let Some(restriction) = self.restriction(&state, ip, cookie, now) {
            return ClaimOutcome::Restricted(restriction);
        }

        let coupon = state.rotation.issue(&self.pool).to_string();
        state.ledger.record(
            ip,
            ClaimRecord {
                timestamp: now,
                coupon: coupon.clone(),
            },
            now,
        );

        ClaimOutcome::Issued(Claim {
            coupon,
            timestamp: now,
            restriction_window: self.window,
        })
    }

    fn restriction(
        &self,
        state: &ClaimState,
        ip: &str,
        cookie: Option<&str>,
        now: i64,
    ) -> Option<Restriction> {
        let from_cookie = cookie
            .and_then(ClaimCookie::issued_at)
            .and_then(|issued_at| claim_cookie::remaining(issued_at, now, self.window));
        if let Some(time_left) = from_cookie {
            return Some(Restriction {
                reason: RestrictionReason::Cookie,
                time_left,
            });
        }

        state.ledger.remaining(ip, now).map(|time_left| Restriction {
            reason: RestrictionReason::Ip,
            time_left,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClaimState> {
        // Nothing under the guard can leave the state half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
