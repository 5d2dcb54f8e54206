//! Price, market cap and volume history for one asset.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::lookup::{resolve_asset, ServiceError};
use crate::models::AssetRef;
use crate::provider::{ChartPoint, HistoryDays, MarketChart, MarketDataProvider};
use crate::store::CryptoRepository;

pub const NO_PRICE_DATA_MESSAGE: &str = "No price data available";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySeries {
    pub prices: Vec<ChartPoint>,
    pub market_caps: Vec<ChartPoint>,
    pub total_volumes: Vec<ChartPoint>,
}

impl From<MarketChart> for HistorySeries {
    fn from(chart: MarketChart) -> Self {
        Self {
            prices: chart.prices,
            market_caps: chart.market_caps,
            total_volumes: chart.total_volumes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub data: HistorySeries,
    pub crypto_id: i64,
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryResponse {
    pub fn is_empty(&self) -> bool {
        self.data.prices.is_empty()
    }
}

/// Diagnostic summary of a price series; logged, never returned to clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStats {
    pub points: usize,
    pub first_ts_ms: i64,
    pub last_ts_ms: i64,
    pub min_price: f64,
    pub max_price: f64,
}

pub fn history_stats(prices: &[ChartPoint]) -> Option<HistoryStats> {
    let first = prices.first()?;
    let last = prices.last()?;
    let (min_price, max_price) = prices.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), ChartPoint(_, price)| (min.min(*price), max.max(*price)),
    );

    Some(HistoryStats {
        points: prices.len(),
        first_ts_ms: first.0,
        last_ts_ms: last.0,
        min_price,
        max_price,
    })
}

pub struct HistoryFetcher {
    provider: Arc<dyn MarketDataProvider>,
    repo: Arc<dyn CryptoRepository>,
    vs_currency: String,
}

impl HistoryFetcher {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        repo: Arc<dyn CryptoRepository>,
        vs_currency: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            repo,
            vs_currency: vs_currency.into(),
        }
    }

    pub async fn get_history(
        &self,
        asset: &AssetRef,
        days: HistoryDays,
    ) -> Result<HistoryResponse, ServiceError> {
        let crypto = resolve_asset(self.repo.as_ref(), asset)?;

        // Provider failures were logged by the client; they read as "no data".
        let chart = self
            .provider
            .market_chart(&crypto.external_id, &self.vs_currency, days)
            .await
            .ok()
            .filter(|chart| !chart.prices.is_empty());

        let (data, message) = match chart {
            Some(chart) => {
                if let Some(stats) = history_stats(&chart.prices) {
                    info!(
                        component = "history",
                        event = "history.fetched",
                        external_id = %crypto.external_id,
                        days = days.get(),
                        points = stats.points,
                        first_ts_ms = stats.first_ts_ms,
                        last_ts_ms = stats.last_ts_ms,
                        min_price = stats.min_price,
                        max_price = stats.max_price
                    );
                }
                (HistorySeries::from(chart), None)
            }
            None => {
                info!(
                    component = "history",
                    event = "history.empty",
                    external_id = %crypto.external_id,
                    days = days.get()
                );
                (
                    HistorySeries::default(),
                    Some(NO_PRICE_DATA_MESSAGE.to_string()),
                )
            }
        };

        Ok(HistoryResponse {
            data,
            crypto_id: crypto.id,
            symbol: crypto.symbol,
            name: crypto.name,
            message,
        })
    }
}
