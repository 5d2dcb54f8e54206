//! Periodic reconciliation trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::reconciler::{MarketDataReconciler, ReconcileMode};

/// Runs a full reconciliation on every tick, starting immediately. A tick
/// that finds a pass already in flight is skipped, never queued.
pub fn spawn_reconcile_scheduler(
    reconciler: Arc<MarketDataReconciler>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if reconciler
                .try_reconcile(ReconcileMode::Full)
                .await
                .is_none()
            {
                info!(
                    component = "scheduler",
                    event = "scheduler.tick.skipped",
                    interval_secs = every.as_secs()
                );
            }
        }
    })
}
