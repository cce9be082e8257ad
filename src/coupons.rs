/// Fixed, ordered list of coupon codes handed out by the service.
#[derive(Debug, Clone)]
pub struct CouponPool {
    codes: Vec<String>,
}

impl CouponPool {
    pub fn new(codes: Vec<String>) -> anyhow::Result<Self> {
        if codes.is_empty() {
            anyhow::bail!("coupon pool must contain at least one code");
        }
        Ok(Self { codes })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Round-robin cursor into a [`CouponPool`]. Always in `[0, pool.len())`.
#[derive(Debug, Default)]
pub struct Rotation {
    cursor: usize,
}

impl Rotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Returns the code under the cursor and moves the cursor one step forward.
    pub fn issue<'a>(&mut self, pool: &'a CouponPool) -> &'a str {
        let code = &pool.codes[self.cursor % pool.len()];
        self.cursor = (self.cursor + 1) % pool.len();
        code
    }
}
