//! Parallel asset caching for a batch of ads.
//!
//! One task per ad; each task owns its ad until it finishes. The batch call
//! waits for every task, so the caller always gets back a fully classified
//! batch: cached ads are registered as in progress, failed ones come back
//! flagged `should_expire`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ad::Advertisement;
use crate::error::CacheError;
use crate::events::{EventLevel, EventSink};
use crate::registry::InProgressRegistry;

/// Injected cache: `(remote url, ttl) -> local path`. Called on the blocking pool.
pub type CacheFn = Arc<dyn Fn(&str, Duration) -> Result<String, CacheError> + Send + Sync>;

pub struct AssetCacheFanout {
    cache: Option<CacheFn>,
    ttl: Duration,
    registry: Arc<InProgressRegistry>,
    events: EventSink,
    limit: Option<Arc<Semaphore>>,
}

impl AssetCacheFanout {
    /// `max_parallel == 0` leaves parallelism bounded only by the batch size.
    pub fn new(
        cache: Option<CacheFn>,
        ttl: Duration,
        registry: Arc<InProgressRegistry>,
        events: EventSink,
        max_parallel: usize,
    ) -> Self {
        Self {
            cache,
            ttl,
            registry,
            events,
            limit: (max_parallel > 0).then(|| Arc::new(Semaphore::new(max_parallel))),
        }
    }

    #[cfg(test)]
    fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Cache and register every ad in `ads`, returning them in their original order.
    pub async fn run(&self, ads: Vec<Advertisement>) -> Vec<Advertisement> {
        let Some(cache) = self.cache.clone() else {
            return ads
                .into_iter()
                .map(|mut ad| {
                    register(&self.registry, &mut ad);
                    ad
                })
                .collect();
        };

        let total = ads.len();
        // Returned in place of any ad whose task died.
        let originals = ads.clone();
        let mut join_set = JoinSet::new();
        for (index, ad) in ads.into_iter().enumerate() {
            let cache = Arc::clone(&cache);
            let registry = Arc::clone(&self.registry);
            let events = self.events.clone();
            let limit = self.limit.clone();
            let ttl = self.ttl;
            join_set.spawn(async move {
                let _permit = match limit {
                    Some(limit) => limit.acquire_owned().await.ok(),
                    None => None,
                };
                (index, cache_one(ad, cache, ttl, &registry, &events).await)
            });
        }

        let mut slots: Vec<Option<Advertisement>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, ad)) => slots[index] = Some(ad),
                Err(e) => tracing::error!("asset cache task failed: {}", e),
            }
        }
        slots
            .into_iter()
            .zip(originals)
            .map(|(slot, mut original)| {
                slot.unwrap_or_else(|| {
                    tracing::error!(ad_id = %original.id, "no cache result, expiring ad");
                    original.should_expire = true;
                    original
                })
            })
            .collect()
    }
}

async fn cache_one(
    mut ad: Advertisement,
    cache: CacheFn,
    ttl: Duration,
    registry: &InProgressRegistry,
    events: &EventSink,
) -> Advertisement {
    let Some(url) = ad.asset_url.clone().filter(|u| !u.is_empty()) else {
        tracing::warn!(ad_id = %ad.id, "ad has no asset url");
        events.publish("app-cache-failed", "", EventLevel::Warning);
        ad.should_expire = true;
        return ad;
    };

    let outcome = tokio::task::spawn_blocking({
        let url = url.clone();
        move || cache(&url, ttl)
    })
    .await
    .unwrap_or_else(|e| Err(CacheError::new(format!("cache task: {}", e))));

    match outcome {
        Ok(local) => {
            tracing::debug!(ad_id = %ad.id, %url, %local, "asset cached");
            ad.original_asset_url = Some(url);
            ad.asset_url = Some(local);
            register(registry, &mut ad);
        }
        Err(e) => {
            tracing::warn!(ad_id = %ad.id, "unable to cache asset {}: {}", url, e);
            events.publish("app-cache-failed", &url, EventLevel::Warning);
            ad.should_expire = true;
        }
    }
    ad
}

// An ad the registry refuses cannot be confirmed later, so it is expired instead.
fn register(registry: &InProgressRegistry, ad: &mut Advertisement) {
    if let Err(e) = registry.add(ad.clone()) {
        tracing::warn!(ad_id = %ad.id, "not tracking ad: {}", e);
        ad.should_expire = true;
    }
}
