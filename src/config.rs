//! Runtime configuration assembled from `COINWATCH_*` environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limiter interval must be greater than zero")]
    ZeroInterval,
    #[error("rate limiter request budget must be at least 1")]
    ZeroRequestBudget,
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub vs_currency: String,
    pub market_limit: u32,
    pub requests_per_interval: u32,
    pub rate_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            api_key: None,
            timeout_ms: 15_000,
            vs_currency: "usd".to_string(),
            market_limit: 10,
            requests_per_interval: 30,
            rate_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub provider: ProviderConfig,
    pub cache_ttl: Duration,
    pub reconcile_interval: Duration,
    pub image_check_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: PathBuf::from("data/coinwatch.sqlite"),
            provider: ProviderConfig::default(),
            cache_ttl: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(900),
            image_check_timeout_ms: 5_000,
        }
    }
}

pub fn app_config_from_env() -> Result<AppConfig, ConfigError> {
    app_config_from_lookup(|key| env::var(key).ok())
}

/// Builds the config from an arbitrary key lookup. Blank values count as unset.
pub fn app_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    let mut config = AppConfig::default();

    if let Some(raw) = get("COINWATCH_BIND_ADDR") {
        config.bind_addr = parse_value("COINWATCH_BIND_ADDR", &raw)?;
    }
    if let Some(raw) = get("COINWATCH_DB_PATH") {
        config.db_path = PathBuf::from(raw);
    }
    if let Some(raw) = get("COINWATCH_PROVIDER_BASE_URL") {
        config.provider.base_url = raw.trim_end_matches('/').to_string();
    }
    config.provider.api_key = get("COINWATCH_PROVIDER_API_KEY");
    if let Some(raw) = get("COINWATCH_PROVIDER_TIMEOUT_MS") {
        config.provider.timeout_ms = parse_value("COINWATCH_PROVIDER_TIMEOUT_MS", &raw)?;
    }
    if let Some(raw) = get("COINWATCH_VS_CURRENCY") {
        config.provider.vs_currency = raw.to_ascii_lowercase();
    }
    if let Some(raw) = get("COINWATCH_MARKET_LIMIT") {
        config.provider.market_limit = parse_value("COINWATCH_MARKET_LIMIT", &raw)?;
    }
    if let Some(raw) = get("COINWATCH_RATE_LIMIT_REQUESTS") {
        config.provider.requests_per_interval = parse_value("COINWATCH_RATE_LIMIT_REQUESTS", &raw)?;
    }
    if let Some(raw) = get("COINWATCH_RATE_LIMIT_INTERVAL_SECS") {
        config.provider.rate_interval = Duration::from_secs(parse_value(
            "COINWATCH_RATE_LIMIT_INTERVAL_SECS",
            &raw,
        )?);
    }
    if let Some(raw) = get("COINWATCH_CACHE_TTL_SECS") {
        config.cache_ttl = Duration::from_secs(parse_value("COINWATCH_CACHE_TTL_SECS", &raw)?);
    }
    if let Some(raw) = get("COINWATCH_RECONCILE_INTERVAL_SECS") {
        config.reconcile_interval = Duration::from_secs(parse_value(
            "COINWATCH_RECONCILE_INTERVAL_SECS",
            &raw,
        )?);
    }
    if let Some(raw) = get("COINWATCH_IMAGE_CHECK_TIMEOUT_MS") {
        config.image_check_timeout_ms = parse_value("COINWATCH_IMAGE_CHECK_TIMEOUT_MS", &raw)?;
    }

    if config.reconcile_interval.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: "COINWATCH_RECONCILE_INTERVAL_SECS",
            value: "0".to_string(),
        });
    }

    Ok(config)
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
