//! In-progress ad registry.
//!
//! Holds every ad handed to the caller that still awaits a confirm or expire.
//! The remote service expires leases on its own, so the lease sweep drops
//! entries locally without notifying it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ad::Advertisement;
use crate::error::AdError;

#[derive(Debug, Default)]
pub struct InProgressRegistry {
    ads: RwLock<HashMap<String, Advertisement>>,
}

impl InProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert by id. An existing entry with the same id is replaced.
    pub fn add(&self, ad: Advertisement) -> Result<(), AdError> {
        ad.validate()?;
        if ad.should_expire {
            return Err(AdError::MarkedForExpiry { ad_id: ad.id });
        }
        if let Some(previous) = self.write().insert(ad.id.clone(), ad) {
            tracing::debug!(ad_id = %previous.id, "replaced in-progress ad");
        }
        Ok(())
    }

    /// Take the entry out of the registry.
    pub fn remove(&self, ad_id: &str) -> Option<Advertisement> {
        self.write().remove(ad_id)
    }

    pub fn contains(&self, ad_id: &str) -> bool {
        self.read().contains_key(ad_id)
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> HashMap<String, Advertisement> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every entry whose lease has elapsed at `now` (epoch seconds).
    /// Returns the removed ids.
    pub fn sweep(&self, now: i64) -> Vec<String> {
        let mut ads = self.write();
        let expired: Vec<String> = ads
            .values()
            .filter(|ad| ad.lease_elapsed(now))
            .map(|ad| ad.id.clone())
            .collect();
        for id in &expired {
            ads.remove(id);
        }
        expired
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Advertisement>> {
        self.ads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Advertisement>> {
        self.ads.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ad(id: &str, lease_expiry: Option<i64>) -> Advertisement {
        Advertisement {
            asset_url: Some(format!("http://cdn/{}.mp4", id)),
            lease_expiry,
            ..Advertisement::new(id)
        }
    }

    #[test]
    fn add_then_remove_returns_the_same_ad() {
        let registry = InProgressRegistry::new();
        let a = ad("1", Some(10));
        registry.add(a.clone()).unwrap();
        assert!(registry.contains("1"));
        assert_eq!(registry.remove("1"), Some(a));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unknown_id_is_none() {
        let registry = InProgressRegistry::new();
        assert_eq!(registry.remove("nope"), None);
        registry.add(ad("1", None)).unwrap();
        registry.remove("1");
        assert_eq!(registry.remove("1"), None, "second remove finds nothing");
    }

    #[test]
    fn add_rejects_missing_id_and_expiring_ads() {
        let registry = InProgressRegistry::new();
        assert_eq!(registry.add(ad("", None)), Err(AdError::MissingId));
        let mut doomed = ad("2", None);
        doomed.should_expire = true;
        assert_eq!(
            registry.add(doomed),
            Err(AdError::MarkedForExpiry { ad_id: "2".into() })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_add_overwrites() {
        let registry = InProgressRegistry::new();
        registry.add(ad("1", Some(10))).unwrap();
        registry.add(ad("1", Some(20))).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()["1"].lease_expiry, Some(20));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let registry = InProgressRegistry::new();
        registry.add(ad("1", Some(10))).unwrap();
        let mut snap = registry.snapshot();
        snap.clear();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_removes_elapsed_leases_only() {
        let registry = InProgressRegistry::new();
        registry.add(ad("later", Some(12345))).unwrap();
        registry.add(ad("now", Some(1000))).unwrap();
        registry.add(ad("future", Some(2000))).unwrap();
        registry.add(ad("no-lease", None)).unwrap();

        let mut removed = registry.sweep(1000);
        removed.sort();
        assert_eq!(removed, vec!["no-lease".to_string(), "now".to_string()]);
        // 12345 > 1000, still leased
        assert!(registry.contains("later"));
        assert!(registry.contains("future"));

        let removed = registry.sweep(20_000);
        assert_eq!(removed.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_add_remove_snapshot() {
        let registry = Arc::new(InProgressRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("{}-{}", worker, i);
                        registry.add(ad(&id, Some(i))).unwrap();
                        let _ = registry.snapshot();
                        if i % 2 == 0 {
                            assert!(registry.remove(&id).is_some());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 100);
    }
}
