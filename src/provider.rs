//! CoinGecko-style market data provider: boundary types and the HTTP client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::rate_limiter::RateLimiter;

pub const MIN_HISTORY_DAYS: u16 = 1;
pub const MAX_HISTORY_DAYS: u16 = 365;
pub const DEFAULT_HISTORY_DAYS: u16 = 7;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("invalid provider URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("provider returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("provider request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("provider transport error for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("failed to decode provider response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientBuild(_) => "client_build",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Status { .. } => "http_status",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
        }
    }
}

/// Query for the "top N by market cap" listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketListParams {
    pub vs_currency: String,
    pub per_page: u32,
    pub page: u32,
}

impl Default for MarketListParams {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            per_page: 10,
            page: 1,
        }
    }
}

impl From<&ProviderConfig> for MarketListParams {
    fn from(cfg: &ProviderConfig) -> Self {
        Self {
            vs_currency: cfg.vs_currency.clone(),
            per_page: cfg.market_limit,
            page: 1,
        }
    }
}

/// Wire shape of one `/coins/markets` entry. Every field is optional so a
/// sparse entry can be rejected on its own instead of failing the listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketCoin {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub current_price: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub total_volume: Option<Decimal>,
    pub price_change_percentage_24h: Option<Decimal>,
}

/// Internal market record produced at the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub external_id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,
    pub inline_image: Option<String>,
}

impl MarketSnapshot {
    /// Missing numbers default to zero; entries without an id are rejected.
    pub fn from_market_coin(coin: MarketCoin) -> Option<Self> {
        let external_id = coin.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())?;
        let symbol = coin
            .symbol
            .map(|symbol| symbol.trim().to_ascii_uppercase())
            .filter(|symbol| !symbol.is_empty())
            .unwrap_or_else(|| external_id.to_ascii_uppercase());
        let name = coin
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| external_id.clone());

        Some(Self {
            external_id,
            symbol,
            name,
            current_price: coin.current_price.unwrap_or(Decimal::ZERO),
            market_cap: coin.market_cap.unwrap_or(Decimal::ZERO),
            volume_24h: coin.total_volume.unwrap_or(Decimal::ZERO),
            price_change_24h: coin.price_change_percentage_24h.unwrap_or(Decimal::ZERO),
            inline_image: coin.image.filter(|image| !image.trim().is_empty()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageSet {
    pub thumb: Option<String>,
    pub small: Option<String>,
    pub large: Option<String>,
}

/// The slice of `/coins/{id}` the core uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoinDetail {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<ImageSet>,
}

/// One `[timestamp_ms, value]` pair of a market chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint(pub i64, pub f64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
    #[serde(default)]
    pub prices: Vec<ChartPoint>,
    #[serde(default)]
    pub market_caps: Vec<ChartPoint>,
    #[serde(default)]
    pub total_volumes: Vec<ChartPoint>,
}

/// Day range for history requests, always within `[1, 365]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryDays(u16);

impl HistoryDays {
    pub fn clamped(days: i64) -> Self {
        Self(days.clamp(i64::from(MIN_HISTORY_DAYS), i64::from(MAX_HISTORY_DAYS)) as u16)
    }

    /// Lenient query parsing: numeric input is truncated and clamped,
    /// anything else falls back to the default week.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };

        if let Ok(days) = raw.parse::<i64>() {
            return Self::clamped(days);
        }
        match raw.parse::<f64>() {
            Ok(days) if days.is_finite() => Self::clamped(days.trunc() as i64),
            _ => Self::default(),
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl Default for HistoryDays {
    fn default() -> Self {
        Self(DEFAULT_HISTORY_DAYS)
    }
}

/// Market data operations. Implementations log their own failures; callers
/// treat an `Err` as "no data this time" and degrade.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + 'static {
    async fn list_markets(
        &self,
        params: &MarketListParams,
    ) -> Result<Vec<MarketSnapshot>, ProviderError>;

    async fn coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError>;

    async fn trending(&self) -> Result<serde_json::Value, ProviderError>;

    async fn market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: HistoryDays,
    ) -> Result<MarketChart, ProviderError>;
}

pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    limiter: Arc<RateLimiter>,
}

impl CoinGeckoClient {
    pub fn new(cfg: &ProviderConfig, limiter: Arc<RateLimiter>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProviderError::ClientBuild(err.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            timeout_ms: cfg.timeout_ms,
            limiter,
        })
    }

    fn api_key_header(&self) -> &'static str {
        if self.base_url.contains("pro-api.") {
            "x-cg-pro-api-key"
        } else {
            "x-cg-demo-api-key"
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let result = self.fetch(path, query).await;
        match &result {
            Ok(_) => debug!(
                component = "provider",
                event = "provider.request.ok",
                endpoint
            ),
            Err(err) => warn!(
                component = "provider",
                event = "provider.request.failed",
                endpoint,
                kind = err.kind(),
                error = %err
            ),
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let raw_url = format!("{}{}", self.base_url, path);
        let url = Url::parse_with_params(&raw_url, query).map_err(|err| {
            ProviderError::InvalidUrl {
                url: raw_url.clone(),
                message: err.to_string(),
            }
        })?;

        self.limiter.wait().await;

        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header(), key);
        }

        let response = request.send().await.map_err(|err| self.transport_error(&raw_url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: raw_url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(&raw_url, err))?;

        serde_json::from_slice(&body).map_err(|err| ProviderError::Decode {
            url: raw_url,
            message: err.to_string(),
        })
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            ProviderError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoClient {
    async fn list_markets(
        &self,
        params: &MarketListParams,
    ) -> Result<Vec<MarketSnapshot>, ProviderError> {
        let entries: Vec<serde_json::Value> = self
            .get_json(
                "coins.markets",
                "/coins/markets",
                &[
                    ("vs_currency", params.vs_currency.clone()),
                    ("order", "market_cap_desc".to_string()),
                    ("per_page", params.per_page.to_string()),
                    ("page", params.page.to_string()),
                    ("sparkline", "false".to_string()),
                ],
            )
            .await?;

        Ok(decode_market_entries(entries))
    }

    async fn coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError> {
        self.get_json(
            "coins.detail",
            &format!("/coins/{id}"),
            &[
                ("localization", "false".to_string()),
                ("tickers", "false".to_string()),
                ("market_data", "false".to_string()),
                ("community_data", "false".to_string()),
                ("developer_data", "false".to_string()),
            ],
        )
        .await
    }

    async fn trending(&self) -> Result<serde_json::Value, ProviderError> {
        self.get_json("search.trending", "/search/trending", &[])
            .await
    }

    async fn market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: HistoryDays,
    ) -> Result<MarketChart, ProviderError> {
        self.get_json(
            "coins.market_chart",
            &format!("/coins/{id}/market_chart"),
            &[
                ("vs_currency", vs_currency.to_string()),
                ("days", days.get().to_string()),
            ],
        )
        .await
    }
}

/// Decodes listing entries one by one, dropping the ones that do not fit.
pub fn decode_market_entries(entries: Vec<serde_json::Value>) -> Vec<MarketSnapshot> {
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let decoded = serde_json::from_value::<MarketCoin>(entry)
            .map_err(|err| err.to_string())
            .and_then(|coin| {
                MarketSnapshot::from_market_coin(coin).ok_or_else(|| "missing id".to_string())
            });

        match decoded {
            Ok(snapshot) => out.push(snapshot),
            Err(error) => warn!(
                component = "provider",
                event = "provider.market_entry.skipped",
                index,
                error = %error
            ),
        }
    }
    out
}
