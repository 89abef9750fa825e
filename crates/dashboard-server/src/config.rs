use anyhow::{Context, Result};
use std::env;

use polygon_client::DEFAULT_BASE_URL;

/// Upper bound for `DEFAULT_LOOKBACK_DAYS` (about a century)
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Fallback key when the browser does not send one
    pub polygon_api_key: Option<String>,
    pub polygon_base_url: String,
    /// Requests per minute (free tier: 5)
    pub polygon_rate_limit: usize,
    /// CORS origins; empty means same-origin only
    pub allowed_origins: Vec<String>,
    pub default_lookback_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            polygon_api_key: None,
            polygon_base_url: DEFAULT_BASE_URL.to_string(),
            polygon_rate_limit: 5,
            allowed_origins: Vec::new(),
            default_lookback_days: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let polygon_rate_limit = match lookup("POLYGON_RATE_LIMIT") {
            Some(v) => v.trim().parse().context("POLYGON_RATE_LIMIT must be a positive integer")?,
            None => defaults.polygon_rate_limit,
        };
        let default_lookback_days = match lookup("DEFAULT_LOOKBACK_DAYS") {
            Some(v) => v.trim().parse().context("DEFAULT_LOOKBACK_DAYS must be an integer")?,
            None => defaults.default_lookback_days,
        };

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            polygon_api_key: lookup("POLYGON_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            polygon_base_url: lookup("POLYGON_BASE_URL").unwrap_or(defaults.polygon_base_url),
            polygon_rate_limit,
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            default_lookback_days,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.polygon_rate_limit == 0 {
            anyhow::bail!("POLYGON_RATE_LIMIT must be at least 1");
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.default_lookback_days) {
            anyhow::bail!(
                "DEFAULT_LOOKBACK_DAYS must be between 1 and {}",
                MAX_LOOKBACK_DAYS
            );
        }
        Ok(())
    }
}
