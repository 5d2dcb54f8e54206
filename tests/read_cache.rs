mod common;

use std::sync::Arc;
use std::time::Duration;

use coinwatch::{InMemoryCache, ReadCache, ReconcileMode};
use common::{reconciler_for, snapshot, MockProvider, InstrumentedRepo};
use rust_decimal_macros::dec;
use tokio::task::JoinSet;

const TTL: Duration = Duration::from_secs(300);

struct Harness {
    provider: Arc<MockProvider>,
    repo: Arc<InstrumentedRepo>,
    reconciler: Arc<coinwatch::MarketDataReconciler>,
    cache: Arc<ReadCache>,
}

fn harness() -> Harness {
    let provider = Arc::new(MockProvider::with_coins(vec![
        snapshot("ethereum", "ETH", dec!(3000), dec!(360000000000)),
        snapshot("bitcoin", "BTC", dec!(50000), dec!(1000000000000)),
    ]));
    let repo = Arc::new(InstrumentedRepo::new());
    let reconciler = reconciler_for(provider.clone(), repo.clone());
    let cache = Arc::new(ReadCache::new(
        Arc::new(InMemoryCache::new()),
        repo.clone(),
        reconciler.clone(),
        TTL,
    ));
    Harness {
        provider,
        repo,
        reconciler,
        cache,
    }
}

#[tokio::test(start_paused = true)]
async fn second_read_inside_ttl_skips_storage() {
    let h = harness();
    h.reconciler.reconcile(ReconcileMode::Fast).await;

    let first = h.cache.get_market_list(false).await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    let second = h.cache.get_market_list(false).await.unwrap();

    assert_eq!(h.repo.list_calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first[0].external_id, "bitcoin");
    assert_eq!(first[1].external_id, "ethereum");
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_reloaded_from_storage() {
    let h = harness();
    h.reconciler.reconcile(ReconcileMode::Fast).await;

    h.cache.get_market_list(false).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    h.cache.get_market_list(false).await.unwrap();

    assert_eq!(h.repo.list_calls(), 2);
    assert_eq!(h.reconciler.completed_passes(), 1);
}

#[tokio::test(start_paused = true)]
async fn force_refresh_runs_exactly_one_pass_and_returns_fresh_rows() {
    let h = harness();
    h.reconciler.reconcile(ReconcileMode::Fast).await;
    let stale = h.cache.get_market_list(false).await.unwrap();
    assert_eq!(stale[0].current_price, dec!(50000));

    h.provider.set_coins(vec![snapshot(
        "bitcoin",
        "BTC",
        dec!(64000),
        dec!(1250000000000),
    )]);
    let fresh = h.cache.get_market_list(true).await.unwrap();

    assert_eq!(h.reconciler.completed_passes(), 2);
    assert_eq!(fresh[0].current_price, dec!(64000));

    let cached = h.cache.get_market_list(false).await.unwrap();
    assert!(Arc::ptr_eq(&fresh, &cached));
    assert_eq!(h.reconciler.completed_passes(), 2);
}

#[tokio::test(start_paused = true)]
async fn cold_start_reconciles_once_then_serves_rows() {
    let h = harness();

    let list = h.cache.get_market_list(false).await.unwrap();

    assert_eq!(h.reconciler.completed_passes(), 1);
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].symbol, "BTC");
}

#[tokio::test(start_paused = true)]
async fn cold_start_during_outage_caches_the_empty_list() {
    let h = harness();
    h.provider.set_listing_down(true);

    let first = h.cache.get_market_list(false).await.unwrap();
    let second = h.cache.get_market_list(false).await.unwrap();

    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(h.provider.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_readers_share_one_reconciliation() {
    let h = harness();
    h.provider.set_list_delay(Duration::from_millis(500));

    let mut readers = JoinSet::new();
    for _ in 0..8 {
        let cache = Arc::clone(&h.cache);
        readers.spawn(async move { cache.get_market_list(false).await.unwrap().len() });
    }

    while let Some(joined) = readers.join_next().await {
        assert_eq!(joined.unwrap(), 2);
    }
    assert_eq!(h.provider.list_calls(), 1);
    assert_eq!(h.reconciler.completed_passes(), 1);
    assert_eq!(h.repo.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_the_next_read_back_to_storage() {
    let h = harness();
    h.reconciler.reconcile(ReconcileMode::Fast).await;

    h.cache.get_market_list(false).await.unwrap();
    h.cache.invalidate();
    h.cache.get_market_list(false).await.unwrap();

    assert_eq!(h.repo.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cold_reader_waits_for_an_in_flight_scheduled_pass_instead_of_repeating_it() {
    let h = harness();
    h.provider.set_list_delay(Duration::from_secs(5));

    let scheduled = {
        let reconciler = Arc::clone(&h.reconciler);
        tokio::spawn(async move { reconciler.try_reconcile(ReconcileMode::Full).await })
    };
    tokio::task::yield_now().await;

    let list = h.cache.get_market_list(false).await.unwrap();

    assert!(scheduled.await.unwrap().is_some());
    assert_eq!(list.len(), 2);
    assert_eq!(h.provider.list_calls(), 1);
    assert_eq!(h.reconciler.completed_passes(), 1);
}

#[tokio::test(start_paused = true)]
async fn cold_reader_overlapping_a_force_refresh_shares_its_pass() {
    let h = harness();
    h.provider.set_list_delay(Duration::from_secs(5));

    let refresh = {
        let cache = Arc::clone(&h.cache);
        tokio::spawn(async move { cache.get_market_list(true).await.unwrap().len() })
    };
    tokio::task::yield_now().await;

    let list = h.cache.get_market_list(false).await.unwrap();

    assert_eq!(refresh.await.unwrap(), 2);
    assert_eq!(list.len(), 2);
    assert_eq!(h.provider.list_calls(), 1);
    assert_eq!(h.reconciler.completed_passes(), 1);
}
