use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COOKIE_NAME: &str = "coupon_claim_data";

/// Client-held mirror of a claim: when it happened and what was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimCookie {
    pub timestamp: i64,
    pub coupon: String,
}

#[derive(Deserialize)]
struct ReceivedCookie {
    timestamp: Value,
}

impl ClaimCookie {
    pub fn to_value(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Claim time carried by a cookie value, in seconds since the epoch.
    ///
    /// Accepts any finite JSON number or numeric string, as a browser-side
    /// client may have written either. Anything else is treated as if no cookie
    /// was sent.
    pub fn issued_at(raw: &str) -> Option<f64> {
        let received: ReceivedCookie = serde_json::from_str(raw).ok()?;
        let timestamp = match received.timestamp {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        timestamp.is_finite().then_some(timestamp)
    }
}

/// Seconds left on a cookie issued at `issued_at`, or `None` once `window` seconds
/// have elapsed. Not capped: a cookie dated in the future restricts for longer.
pub fn remaining(issued_at: f64, now: i64, window: u64) -> Option<u64> {
    let elapsed = now as f64 - issued_at;
    let window = window as f64;
    (elapsed < window).then(|| (window - elapsed).ceil() as u64)
}
