//! Periodic expiry sweep over unconfirmed transactions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::lifecycle::TransactionLifecycle;

/// Runs the sweep loop. Safe to run concurrently with itself and across
/// instances: the conditional status update inside `expire_overdue`
/// arbitrates every race, so the sweeper needs no locking of its own. A
/// failed tick is logged and swallowed; the next tick retries.
pub async fn run_sweeper(lifecycle: Arc<TransactionLifecycle>, interval: Duration) {
    info!("expiration sweeper started, interval {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match lifecycle.expire_overdue().await {
            Ok(0) => {}
            Ok(count) => info!("expired {} overdue transaction(s)", count),
            Err(e) => error!("expiration sweep failed: {}", e),
        }
    }
}
