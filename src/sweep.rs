// Gazette — Purge Sweep
//
// The dead-man's switch: a background task that periodically erases every
// escrow entry not refreshed within `max_age`. It stops by itself once the
// store is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::store::{EscrowRepository, StoreError};

/// Shortest period the sweep will run at. `tokio::time::interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawn the periodic purge. The first sweep runs immediately.
pub fn spawn_purge_sweep(
    store: Arc<dyn EscrowRepository>,
    max_age: Duration,
    every: Duration,
) -> JoinHandle<()> {
    let every = if every < MIN_PERIOD {
        tracing::warn!(?every, "Purge interval too short, using {:?}", MIN_PERIOD);
        MIN_PERIOD
    } else {
        every
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.purge_older_than(max_age) {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purge sweep erased stale entries"),
                Err(StoreError::Closed) => {
                    tracing::debug!("Store closed, purge sweep exiting");
                    break;
                }
                Err(e) => tracing::error!(error = %e, "Purge sweep failed"),
            }
        }
    })
}
