use std::sync::Arc;

use coinwatch::{
    api_router, app_config_from_env, init_logging, log_app_bind, log_app_start,
    log_scheduler_start, logging_config_from_env, spawn_reconcile_scheduler, AppState,
    CoinGeckoClient, CryptoRepository, FollowRegistry, HistoryFetcher, HttpExistenceCheck,
    ImageResolver, InMemoryCache, MarketDataProvider, MarketDataReconciler, MarketListParams,
    RateLimiter, ReadCache, SqliteStore, DEFAULT_ASSET_TYPE_DESCRIPTION, DEFAULT_ASSET_TYPE_NAME,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let cfg = app_config_from_env()?;
    log_app_start(&logging_cfg, &cfg);

    let store = Arc::new(SqliteStore::open(&cfg.db_path)?);
    store.get_or_create_asset_type(DEFAULT_ASSET_TYPE_NAME, Some(DEFAULT_ASSET_TYPE_DESCRIPTION))?;
    let repo: Arc<dyn CryptoRepository> = store;

    let limiter = Arc::new(RateLimiter::new(
        cfg.provider.requests_per_interval,
        cfg.provider.rate_interval,
    )?);
    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(CoinGeckoClient::new(&cfg.provider, limiter)?);
    let images = ImageResolver::new(Arc::new(HttpExistenceCheck::new(
        cfg.image_check_timeout_ms,
    )?));

    let reconciler = Arc::new(MarketDataReconciler::new(
        Arc::clone(&provider),
        images,
        Arc::clone(&repo),
        MarketListParams::from(&cfg.provider),
    ));
    let read_cache = Arc::new(ReadCache::new(
        Arc::new(InMemoryCache::new()),
        Arc::clone(&repo),
        Arc::clone(&reconciler),
        cfg.cache_ttl,
    ));

    let state = AppState {
        read_cache,
        repo: Arc::clone(&repo),
        follows: Arc::new(FollowRegistry::new(Arc::clone(&repo))),
        history: Arc::new(HistoryFetcher::new(
            Arc::clone(&provider),
            Arc::clone(&repo),
            cfg.provider.vs_currency.clone(),
        )),
        provider,
    };

    let _scheduler = spawn_reconcile_scheduler(reconciler, cfg.reconcile_interval);
    log_scheduler_start(cfg.reconcile_interval);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, api_router(state)).await?;

    Ok(())
}
