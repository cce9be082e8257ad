use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

use crate::service::DEFAULT_RESTRICTION_WINDOW_SECONDS;

const DEFAULT_CONFIG_PATH: &str = "coupon-config.toml";

/// Cookie `Max-Age` is a signed 64-bit count of seconds.
pub const MAX_RESTRICTION_WINDOW_SECONDS: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub origin: String,
    pub production: bool,
    pub restriction_window_seconds: u64,
    pub coupons: Vec<String>,
    pub trust_proxy: bool,
    pub max_tracked_ips: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            origin: "*".to_string(),
            production: false,
            restriction_window_seconds: DEFAULT_RESTRICTION_WINDOW_SECONDS,
            coupons: [
                "SPRING25", "SUMMER20", "FALL30", "WINTER15", "WELCOME10", "SPECIAL50",
                "DISCOUNT40", "SAVE35", "DEAL20", "EXTRA15", "BONUS25", "FLASH30",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            trust_proxy: false,
            max_tracked_ips: None,
        }
    }
}

impl Config {
    /// Reads `COUPON_CONFIG` (or `coupon-config.toml`) when present, then applies
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("COUPON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let contents = if std::path::Path::new(&config_path).exists() {
            Some(
                fs::read_to_string(&config_path)
                    .with_context(|| format!("reading {config_path}"))?,
            )
        } else {
            tracing::info!("No config file at {}, using defaults", config_path);
            None
        };

        Self::from_sources(contents.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config: Config = match file {
            Some(contents) => toml::from_str(contents).context("parsing config file")?,
            None => Config::default(),
        };

        if let Some(port) = parse_env(&env, "PORT")? {
            config.port = port;
        }
        if let Some(origin) = env("ORIGIN").filter(|o| !o.is_empty()) {
            config.origin = origin;
        }
        if let Some(app_env) = env("APP_ENV") {
            config.production = app_env.eq_ignore_ascii_case("production");
        }
        if let Some(window) = parse_env(&env, "RESTRICTION_WINDOW_SECONDS")? {
            config.restriction_window_seconds = window;
        }
        if let Some(trust) = parse_env(&env, "TRUST_PROXY")? {
            config.trust_proxy = trust;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.coupons.is_empty() {
            anyhow::bail!("coupons must list at least one code");
        }
        if let Some(blank) = self.coupons.iter().position(|c| c.trim().is_empty()) {
            anyhow::bail!("coupon #{} is blank", blank + 1);
        }
        if self.restriction_window_seconds == 0 {
            anyhow::bail!("restriction_window_seconds must be greater than zero");
        }
        if self.restriction_window_seconds > MAX_RESTRICTION_WINDOW_SECONDS {
            anyhow::bail!(
                "restriction_window_seconds must be at most {}",
                MAX_RESTRICTION_WINDOW_SECONDS
            );
        }
        if self.max_tracked_ips == Some(0) {
            anyhow::bail!("max_tracked_ips must be greater than zero when set");
        }
        Ok(())
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
