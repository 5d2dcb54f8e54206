#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coinwatch::{
    AssetRef, AssetType, CoinDetail, CryptoRepository, Cryptocurrency, CryptocurrencyUpsert,
    ExistenceCheck, FollowedCryptocurrency, HistoryDays, ImageResolver, ImageSet, MarketChart,
    MarketDataProvider, MarketDataReconciler, MarketListParams, MarketSnapshot, ProviderError,
    SqliteStore, StoreError, UpsertOutcome, UserId,
};
use rust_decimal::Decimal;
use serde_json::Value;

pub fn snapshot(id: &str, symbol: &str, price: Decimal, market_cap: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        external_id: id.to_string(),
        symbol: symbol.to_string(),
        name: title_case(id),
        current_price: price,
        market_cap,
        volume_24h: market_cap / Decimal::from(20),
        price_change_24h: Decimal::ZERO,
        inline_image: None,
    }
}

fn title_case(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Scriptable provider double. Listing and chart calls are counted; chart
/// calls record the requested day span.
#[derive(Default)]
pub struct MockProvider {
    coins: Mutex<Vec<MarketSnapshot>>,
    details: Mutex<HashMap<String, CoinDetail>>,
    chart: Mutex<Option<MarketChart>>,
    trending: Mutex<Option<Value>>,
    listing_down: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub chart_days: Mutex<Vec<u16>>,
}

impl MockProvider {
    pub fn with_coins(coins: Vec<MarketSnapshot>) -> Self {
        let provider = Self::default();
        provider.set_coins(coins);
        provider
    }

    pub fn set_coins(&self, coins: Vec<MarketSnapshot>) {
        *self.coins.lock().unwrap() = coins;
    }

    pub fn set_detail_image(&self, id: &str, large: &str) {
        self.details.lock().unwrap().insert(
            id.to_string(),
            CoinDetail {
                id: Some(id.to_string()),
                image: Some(ImageSet {
                    large: Some(large.to_string()),
                    ..ImageSet::default()
                }),
                ..CoinDetail::default()
            },
        );
    }

    pub fn set_chart(&self, chart: Option<MarketChart>) {
        *self.chart.lock().unwrap() = chart;
    }

    pub fn set_trending(&self, trending: Option<Value>) {
        *self.trending.lock().unwrap() = trending;
    }

    pub fn set_listing_down(&self, down: bool) {
        self.listing_down.store(down, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_days(&self) -> Vec<u16> {
        self.chart_days.lock().unwrap().clone()
    }
}

fn unavailable(path: &str) -> ProviderError {
    ProviderError::Status {
        url: format!("https://provider.test{path}"),
        status: 503,
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn list_markets(
        &self,
        _params: &MarketListParams,
    ) -> Result<Vec<MarketSnapshot>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.listing_down.load(Ordering::SeqCst) {
            return Err(unavailable("/coins/markets"));
        }
        Ok(self.coins.lock().unwrap().clone())
    }

    async fn coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                url: format!("https://provider.test/coins/{id}"),
                status: 404,
            })
    }

    async fn trending(&self) -> Result<Value, ProviderError> {
        self.trending
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("/search/trending"))
    }

    async fn market_chart(
        &self,
        id: &str,
        _vs_currency: &str,
        days: HistoryDays,
    ) -> Result<MarketChart, ProviderError> {
        self.chart_days.lock().unwrap().push(days.get());
        self.chart
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable(&format!("/coins/{id}/market_chart")))
    }
}

pub struct NeverExists;

#[async_trait]
impl ExistenceCheck for NeverExists {
    async fn exists(&self, _url: &str) -> bool {
        false
    }
}

/// SQLite store wrapper that counts list queries, can fail upserts for one
/// external id and can fail every asset lookup.
pub struct InstrumentedRepo {
    inner: SqliteStore,
    fail_upsert_for: Mutex<Option<String>>,
    fail_find: AtomicBool,
    list_calls: AtomicUsize,
}

impl InstrumentedRepo {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().expect("in-memory store should open"),
            fail_upsert_for: Mutex::new(None),
            fail_find: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_upsert_for(&self, external_id: &str) {
        *self.fail_upsert_for.lock().unwrap() = Some(external_id.to_string());
    }

    pub fn set_fail_find(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl CryptoRepository for InstrumentedRepo {
    fn get_or_create_asset_type(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<AssetType, StoreError> {
        self.inner.get_or_create_asset_type(name, description)
    }

    fn upsert_cryptocurrency(
        &self,
        row: &CryptocurrencyUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let failing = self.fail_upsert_for.lock().unwrap().clone();
        if failing.as_deref() == Some(row.external_id.as_str()) {
            return Err(StoreError::MissingAfterUpsert(row.external_id.clone()));
        }
        self.inner.upsert_cryptocurrency(row)
    }

    fn list_by_market_cap(&self) -> Result<Vec<Cryptocurrency>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_by_market_cap()
    }

    fn find_cryptocurrency(&self, asset: &AssetRef) -> Result<Option<Cryptocurrency>, StoreError> {
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        self.inner.find_cryptocurrency(asset)
    }

    fn count_cryptocurrencies(&self) -> Result<u64, StoreError> {
        self.inner.count_cryptocurrencies()
    }

    fn insert_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError> {
        self.inner.insert_follow(user, cryptocurrency_id)
    }

    fn delete_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError> {
        self.inner.delete_follow(user, cryptocurrency_id)
    }

    fn list_followed(&self, user: UserId) -> Result<Vec<FollowedCryptocurrency>, StoreError> {
        self.inner.list_followed(user)
    }
}

pub fn reconciler_for(
    provider: Arc<MockProvider>,
    repo: Arc<dyn CryptoRepository>,
) -> Arc<MarketDataReconciler> {
    Arc::new(MarketDataReconciler::new(
        provider,
        ImageResolver::new(Arc::new(NeverExists)),
        repo,
        MarketListParams::default(),
    ))
}
