//! Periodic reclamation of expired cache entries.
//!
//! # Responsibilities
//! - Purge expired entries on a fixed interval
//! - Stop on the shared shutdown signal
//!
//! # Design Decisions
//! - Memory hygiene only; reads already ignore expired entries
//! - Missed ticks are delayed, never burst

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::cache::TtlCache;

/// Background task that sweeps a [`TtlCache`].
pub struct CacheSweeper<V> {
    cache: TtlCache<V>,
    interval: Duration,
}

impl<V: Send + Sync + 'static> CacheSweeper<V> {
    pub fn new(cache: TtlCache<V>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            ttl_ms = self.cache.ttl().as_millis() as u64,
            "Cache sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(
                            removed,
                            remaining = self.cache.len(),
                            "Swept expired cache entries"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
