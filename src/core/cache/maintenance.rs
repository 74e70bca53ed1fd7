use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::store::CacheStore;

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub evicted: usize,
}

/// Sweeps the durable store. The ephemeral tier is never touched here.
#[derive(Clone)]
pub struct CacheMaintenance {
    store: Arc<CacheStore>,
    max_entries: Option<usize>,
}

impl CacheMaintenance {
    pub fn new(store: Arc<CacheStore>, max_entries: Option<usize>) -> Self {
        Self { store, max_entries }
    }

    /// Removes every durable entry past its TTL.
    pub async fn clean_expired(&self) -> usize {
        let removed = self.store.sweep_expired().await;
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        removed
    }

    /// Removes the oldest durable entries until at most `max_entries` remain.
    pub async fn enforce_max_entries(&self, max_entries: usize) -> usize {
        let evicted = self.store.evict_oldest(max_entries).await;
        if evicted > 0 {
            info!(
                "Evicted {} cache entries to stay within {} entries",
                evicted, max_entries
            );
        }
        evicted
    }

    pub async fn run_once(&self) -> MaintenanceReport {
        let expired = self.clean_expired().await;
        let evicted = match self.max_entries {
            Some(max) => self.enforce_max_entries(max).await,
            None => 0,
        };
        MaintenanceReport { expired, evicted }
    }

    /// Runs [`run_once`](Self::run_once) every `interval` until `token` is cancelled.
    pub fn spawn_periodic(self, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Cache maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        debug!(
                            "Cache maintenance pass: {} expired, {} evicted",
                            report.expired, report.evicted
                        );
                    }
                }
            }
        })
    }
}
