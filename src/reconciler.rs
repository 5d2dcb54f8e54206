//! Batch ingestion: provider listing -> image resolution -> upsert by external id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::image::{resolve_from_payloads, ImageQuery, ImageResolver};
use crate::models::{
    CryptocurrencyUpsert, UpsertOutcome, DEFAULT_ASSET_TYPE_DESCRIPTION, DEFAULT_ASSET_TYPE_NAME,
};
use crate::provider::{MarketDataProvider, MarketListParams, MarketSnapshot};
use crate::store::{CryptoRepository, StoreError};

/// How much work a pass spends on images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Detail fetch per coin plus the probed candidate chain.
    Full,
    /// Listing payload only: no detail calls, no existence probes. Used on
    /// request paths where a user is waiting.
    Fast,
}

impl ReconcileMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }
}

pub struct MarketDataReconciler {
    provider: Arc<dyn MarketDataProvider>,
    images: ImageResolver,
    repo: Arc<dyn CryptoRepository>,
    params: MarketListParams,
    run_lock: Mutex<()>,
    passes: AtomicU64,
}

impl MarketDataReconciler {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        images: ImageResolver,
        repo: Arc<dyn CryptoRepository>,
        params: MarketListParams,
    ) -> Self {
        Self {
            provider,
            images,
            repo,
            params,
            run_lock: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }

    /// Runs one pass, waiting for any pass already in flight to finish first.
    pub async fn reconcile(&self, mode: ReconcileMode) -> ReconcileReport {
        let _running = self.run_lock.lock().await;
        self.run_counted(mode).await
    }

    /// Runs one pass unless some pass finished after `seen_passes` was read
    /// from [`completed_passes`](Self::completed_passes). A caller that
    /// arrives while another pass is in flight waits for it and then returns
    /// `None` instead of repeating the provider round trip.
    pub async fn reconcile_unless_ran_since(
        &self,
        mode: ReconcileMode,
        seen_passes: u64,
    ) -> Option<ReconcileReport> {
        let _running = self.run_lock.lock().await;
        let finished = self.completed_passes();
        if finished != seen_passes {
            info!(
                component = "reconciler",
                event = "reconcile.skipped.coalesced",
                mode = mode.as_str(),
                seen_passes,
                finished
            );
            return None;
        }
        Some(self.run_counted(mode).await)
    }

    /// Runs one pass unless another is in flight, in which case `None`.
    pub async fn try_reconcile(&self, mode: ReconcileMode) -> Option<ReconcileReport> {
        let Ok(_running) = self.run_lock.try_lock() else {
            info!(
                component = "reconciler",
                event = "reconcile.skipped.in_flight",
                mode = mode.as_str()
            );
            return None;
        };
        Some(self.run_counted(mode).await)
    }

    /// Number of passes that have run to the end.
    pub fn completed_passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    // Callers hold `run_lock`.
    async fn run_counted(&self, mode: ReconcileMode) -> ReconcileReport {
        let report = self.run_pass(mode).await;
        self.passes.fetch_add(1, Ordering::SeqCst);
        report
    }

    async fn run_pass(&self, mode: ReconcileMode) -> ReconcileReport {
        info!(
            component = "reconciler",
            event = "reconcile.start",
            mode = mode.as_str(),
            per_page = self.params.per_page
        );

        let coins = self
            .provider
            .list_markets(&self.params)
            .await
            .unwrap_or_default();
        if coins.is_empty() {
            info!(
                component = "reconciler",
                event = "reconcile.nothing_to_do",
                mode = mode.as_str()
            );
            return ReconcileReport::default();
        }

        let mut report = ReconcileReport {
            fetched: coins.len(),
            ..ReconcileReport::default()
        };

        let asset_type = match self
            .repo
            .get_or_create_asset_type(DEFAULT_ASSET_TYPE_NAME, Some(DEFAULT_ASSET_TYPE_DESCRIPTION))
        {
            Ok(asset_type) => asset_type,
            Err(err) => {
                warn!(
                    component = "reconciler",
                    event = "reconcile.asset_type.failed",
                    error = %err
                );
                report.failed = coins.len();
                return report;
            }
        };

        for coin in &coins {
            match self.reconcile_one(coin, asset_type.id, mode).await {
                Ok(UpsertOutcome::Created(_)) => report.created += 1,
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        component = "reconciler",
                        event = "reconcile.item.failed",
                        external_id = %coin.external_id,
                        name = %coin.name,
                        error = %err
                    );
                }
            }
        }

        info!(
            component = "reconciler",
            event = "reconcile.finish",
            mode = mode.as_str(),
            fetched = report.fetched,
            created = report.created,
            updated = report.updated,
            failed = report.failed
        );
        report
    }

    async fn reconcile_one(
        &self,
        coin: &MarketSnapshot,
        asset_type_id: i64,
        mode: ReconcileMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let image_url = match mode {
            ReconcileMode::Full => {
                let detail = self.provider.coin_detail(&coin.external_id).await.ok();
                let resolved = self
                    .images
                    .resolve(&ImageQuery {
                        external_id: &coin.external_id,
                        symbol: &coin.symbol,
                        detail: detail.as_ref(),
                        inline_image: coin.inline_image.as_deref(),
                    })
                    .await;
                debug!(
                    component = "reconciler",
                    event = "reconcile.image.resolved",
                    external_id = %coin.external_id,
                    source = resolved.source.as_str()
                );
                Some(resolved.url)
            }
            ReconcileMode::Fast => resolve_from_payloads(&ImageQuery {
                external_id: &coin.external_id,
                symbol: &coin.symbol,
                detail: None,
                inline_image: coin.inline_image.as_deref(),
            })
            .map(|resolved| resolved.url),
        };

        self.repo.upsert_cryptocurrency(&CryptocurrencyUpsert {
            asset_type_id,
            symbol: coin.symbol.to_ascii_uppercase(),
            name: coin.name.clone(),
            slug: coin.external_id.clone(),
            external_id: coin.external_id.clone(),
            current_price: coin.current_price,
            market_cap: coin.market_cap,
            volume_24h: coin.volume_24h,
            price_change_24h: coin.price_change_24h,
            image_url,
        })
    }
}
