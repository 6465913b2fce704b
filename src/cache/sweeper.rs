use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Anything that can drop its expired entries on demand.
pub trait Sweep: Send + Sync {
    fn purge_expired(&self) -> usize;
}

impl<K, V> Sweep for super::TtlLruCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + Send,
    V: Clone + Send,
{
    fn purge_expired(&self) -> usize {
        super::TtlLruCache::purge_expired(self)
    }
}

/// Periodically purges expired entries until `cancel` fires.
pub fn spawn_sweeper(
    caches: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged: usize = caches.iter().map(|cache| cache.purge_expired()).sum();
                    if purged > 0 {
                        log_debug!("cache sweeper purged {} expired entr(ies)", purged);
                    }
                }
                _ = cancel.cancelled() => {
                    log_info!("cache sweeper shutting down");
                    break;
                }
            }
        }
    })
}
