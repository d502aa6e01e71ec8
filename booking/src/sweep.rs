//! Periodic expiry sweep.
//!
//! The hold timer armed at order placement is the primary expiry mechanism;
//! the sweep is the backstop that catches timers lost to a restart. Both
//! paths go through the same reducer transition, which no-ops on terminal
//! orders, so firing twice is harmless.

use std::time::Duration;

use tracing::{debug, info};

use crate::aggregates::BookingAction;
use crate::service::BookingStore;

/// Background task that periodically expires lapsed seat holds
pub struct ExpirySweeper {
    store: BookingStore,
    interval: Duration,
}

impl ExpirySweeper {
    /// Creates a sweeper over the given booking store
    #[must_use]
    pub const fn new(store: BookingStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs the sweep loop until the store shuts down.
    ///
    /// Spawn this with `tokio::spawn`; it exits cleanly when `send` starts
    /// reporting shutdown.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so a freshly started
        // engine does not sweep before any order exists.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.store.send(BookingAction::SweepExpired).await.is_err() {
                debug!("store shutting down, sweeper exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggregates::{BookingEnvironment, BookingReducer};
    use crate::types::{BookingState, Catalog};
    use cinebook_core::environment::SystemClock;
    use cinebook_runtime::Store;
    use std::sync::Arc;

    fn store() -> BookingStore {
        let env = BookingEnvironment::new(
            Arc::new(SystemClock),
            Arc::new(Catalog::new()),
            Duration::from_secs(600),
        );
        Store::new(BookingState::new(), BookingReducer::new(), env)
    }

    #[tokio::test]
    async fn sweeper_exits_on_shutdown() {
        let store = store();
        let sweeper = ExpirySweeper::new(store.clone(), Duration::from_millis(10));
        let handle = tokio::spawn(sweeper.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit after shutdown")
            .unwrap();
    }
}
