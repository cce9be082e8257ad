use std::collections::HashMap;

/// What the server remembers about the last claim made from an IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    pub timestamp: i64,
    pub coupon: String,
}

/// Seconds left before a claim made at `timestamp` stops restricting, or `None`
/// once `window` seconds have elapsed.
pub fn remaining(timestamp: i64, now: i64, window: u64) -> Option<u64> {
    let left = i128::from(window) - (i128::from(now) - i128::from(timestamp));
    (left > 0).then(|| u64::try_from(left).unwrap_or(u64::MAX))
}

/// Per-IP claim ledger. Entries are never expired in the background; they go
/// stale once their window has passed and are only dropped when a bound is set.
pub struct RateLimiter {
    claims: HashMap<String, ClaimRecord>,
    window: u64,
    max_entries: Option<usize>,
}

impl RateLimiter {
    pub fn new(window: u64) -> Self {
        Self {
            claims: HashMap::new(),
            window,
            max_entries: None,
        }
    }

    pub fn bounded(window: u64, max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new(window)
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn get(&self, ip: &str) -> Option<&ClaimRecord> {
        self.claims.get(ip)
    }

    pub fn remaining(&self, ip: &str, now: i64) -> Option<u64> {
        let record = self.claims.get(ip)?;
        remaining(record.timestamp, now, self.window)
    }

    /// Upserts the record for `ip`, overwriting any previous claim.
    pub fn record(&mut self, ip: &str, record: ClaimRecord, now: i64) {
        if let Some(max) = self.max_entries {
            if !self.claims.contains_key(ip) && self.claims.len() >= max {
                self.make_room(max - 1, now);
            }
        }
        self.claims.insert(ip.to_string(), record);
    }

    fn make_room(&mut self, target: usize, now: i64) {
        let window = self.window;
        self.claims
            .retain(|_, r| remaining(r.timestamp, now, window).is_some());

        if self.claims.len() <= target {
            return;
        }
        let mut by_age: Vec<(i64, String)> = self
            .claims
            .iter()
            .map(|(ip, r)| (r.timestamp, ip.clone()))
            .collect();
        by_age.sort();
        let excess = self.claims.len() - target;
        for (_, ip) in by_age.into_iter().take(excess) {
            self.claims.remove(&ip);
        }
        tracing::debug!(evicted = excess, "IP ledger full, evicted oldest live claims");
    }
}
