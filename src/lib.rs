//! Round-robin coupon dispenser that allows one claim per client per
//! restriction window, enforced by both a server-side IP ledger and a
//! client-held claim cookie.

pub mod app;
pub mod claim_cookie;
pub mod config;
pub mod coupons;
pub mod rate_limiter;
pub mod service;
