//! Coinwatch core crate.
//!
//! Ingests market data from a CoinGecko-compatible provider under a request
//! budget, reconciles it into SQLite by external id, resolves per-asset icons
//! and serves the result through a TTL cache and a small JSON API.

mod api;
mod cache;
mod config;
mod follow;
mod history;
mod image;
mod lookup;
mod models;
mod observability;
mod provider;
mod rate_limiter;
mod reconciler;
mod scheduler;
mod store;

pub use api::{
    api_router, ApiError, AppState, AuthUser, HistoryQuery, MarketListQuery, FOLLOWED_MESSAGE,
    HISTORY_FAILED_MESSAGE, NOT_FOUND_MESSAGE, UNFOLLOWED_MESSAGE, USER_ID_HEADER,
};
pub use cache::{
    InMemoryCache, MarketList, MarketListCache, ReadCache, DEFAULT_MARKET_LIST_TTL,
    MARKET_LIST_CACHE_KEY,
};
pub use config::{
    app_config_from_env, app_config_from_lookup, AppConfig, ConfigError, ProviderConfig,
    DEFAULT_PROVIDER_BASE_URL,
};
pub use follow::{FollowOutcome, FollowRegistry, UnfollowOutcome};
pub use history::{
    history_stats, HistoryFetcher, HistoryResponse, HistorySeries, HistoryStats,
    NO_PRICE_DATA_MESSAGE,
};
pub use image::{
    candidate_urls, fallback_url, normalize_image_url, resolve_from_payloads, ExistenceCheck,
    HttpExistenceCheck, ImageQuery, ImageResolver, ImageSource, ResolvedImage,
};
pub use lookup::{resolve_asset, ServiceError};
pub use models::{
    AssetRef, AssetType, Cryptocurrency, CryptocurrencyUpsert, FollowedCryptocurrency, UpsertOutcome,
    UserId, DEFAULT_ASSET_TYPE_DESCRIPTION, DEFAULT_ASSET_TYPE_NAME,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_scheduler_start, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError, LOG_FORMAT_VAR,
    LOG_LEVEL_VAR, LOG_TARGET_VAR,
};
pub use provider::{
    decode_market_entries, ChartPoint, CoinDetail, CoinGeckoClient, HistoryDays, ImageSet,
    MarketChart, MarketCoin, MarketDataProvider, MarketListParams, MarketSnapshot, ProviderError,
    DEFAULT_HISTORY_DAYS, MAX_HISTORY_DAYS, MIN_HISTORY_DAYS,
};
pub use rate_limiter::RateLimiter;
pub use reconciler::{MarketDataReconciler, ReconcileMode, ReconcileReport};
pub use scheduler::spawn_reconcile_scheduler;
pub use store::{CryptoRepository, SqliteStore, StoreError};
