//! Operational cache surface: stats, pattern invalidation, cleanup, and the
//! background sweeper that purges expired entries.

use pecoin_core::{Error, Result};
use pecoin_persistence::{CacheStats, ManagedCache};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub pattern: String,
    /// Removed entries per cache
    pub removed: BTreeMap<String, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: BTreeMap<String, usize>,
    pub total: usize,
}

/// Every cache in the process, by name
#[derive(Default)]
pub struct CacheRegistry {
    caches: Vec<Arc<dyn ManagedCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cache: Arc<dyn ManagedCache>) {
        self.caches.push(cache);
    }

    pub fn register_all(&mut self, caches: impl IntoIterator<Item = Arc<dyn ManagedCache>>) {
        self.caches.extend(caches);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.caches.iter().map(|c| c.name()).collect()
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        self.caches.iter().map(|c| c.stats()).collect()
    }

    pub fn stats_for(&self, name: &str) -> Result<CacheStats> {
        self.select(Some(name)).map(|caches| caches[0].stats())
    }

    /// Remove entries whose key matches `pattern` (a regex), in one cache
    /// or in all of them
    pub fn invalidate(&self, pattern: &str, cache: Option<&str>) -> Result<InvalidationReport> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::ValidationError(format!("invalid pattern: {}", e)))?;

        let mut removed = BTreeMap::new();
        for c in self.select(cache)? {
            removed.insert(c.name().to_string(), c.invalidate_matching(&regex));
        }
        let total = removed.values().sum();
        info!("Invalidated {} entries matching {}", total, pattern);

        Ok(InvalidationReport {
            pattern: pattern.to_string(),
            removed,
            total,
        })
    }

    /// Purge expired entries everywhere
    pub fn cleanup(&self) -> CleanupReport {
        let removed: BTreeMap<String, usize> = self
            .caches
            .iter()
            .map(|c| (c.name().to_string(), c.cleanup()))
            .collect();
        let total = removed.values().sum();
        CleanupReport { removed, total }
    }

    /// Empty one cache or all of them; returns how many were cleared
    pub fn clear(&self, cache: Option<&str>) -> Result<usize> {
        let selected = self.select(cache)?;
        for c in &selected {
            c.clear();
        }
        info!("Cleared {} cache(s)", selected.len());
        Ok(selected.len())
    }

    fn select(&self, name: Option<&str>) -> Result<Vec<Arc<dyn ManagedCache>>> {
        match name {
            None => Ok(self.caches.clone()),
            Some(name) => self
                .caches
                .iter()
                .find(|c| c.name() == name)
                .map(|c| vec![c.clone()])
                .ok_or_else(|| Error::ValidationError(format!("unknown cache: {}", name))),
        }
    }
}

/// Handle to the background sweeper
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Sweep expired entries every `period` until `parent` is cancelled
pub fn spawn_maintenance(
    registry: Arc<CacheRegistry>,
    period: Duration,
    parent: &CancellationToken,
) -> MaintenanceHandle {
    let cancel = parent.child_token();
    let task = tokio::spawn(maintenance_loop(registry, period, cancel.clone()));
    MaintenanceHandle { cancel, task }
}

async fn maintenance_loop(registry: Arc<CacheRegistry>, period: Duration, cancel: CancellationToken) {
    info!("Cache sweeper started (every {}s)", period.as_secs());
    let mut interval = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cache sweeper cancelled, exiting");
                break;
            }
            _ = interval.tick() => {
                let report = registry.cleanup();
                if report.total > 0 {
                    info!("Swept {} expired cache entries", report.total);
                } else {
                    debug!("Cache sweep found nothing to remove");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pecoin_persistence::TtlCache;
    use tokio::time::advance;

    fn registry() -> (Arc<TtlCache<String, u32>>, Arc<TtlCache<String, u32>>, CacheRegistry) {
        let balances = Arc::new(TtlCache::new("balances", Duration::from_secs(120), 10));
        let urls = Arc::new(TtlCache::new("signed_urls", Duration::from_secs(3600), 10));
        let mut registry = CacheRegistry::new();
        registry.register(balances.clone());
        registry.register(urls.clone());
        (balances, urls, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_across_and_within_caches() {
        let (balances, urls, registry) = registry();
        balances.insert("W1:MINT".into(), 1);
        balances.insert("W2:MINT".into(), 2);
        urls.insert("logos/W1.png".into(), 3);

        let report = registry.invalidate("W1", None).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.removed["balances"], 1);

        let report = registry.invalidate(":MINT$", Some("balances")).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_pattern_and_unknown_cache_rejected() {
        let (_, _, registry) = registry();
        assert!(matches!(registry.invalidate("(", None), Err(Error::ValidationError(_))));
        assert!(registry.invalidate(".*", Some("nope")).is_err());
        assert!(registry.clear(Some("nope")).is_err());
        assert_eq!(registry.names(), vec!["balances", "signed_urls"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_and_clear() {
        let (balances, urls, registry) = registry();
        balances.insert("a".into(), 1);
        urls.insert("b".into(), 2);
        advance(Duration::from_secs(120)).await;

        let report = registry.cleanup();
        assert_eq!(report.total, 1);
        assert_eq!(registry.stats_for("signed_urls").unwrap().valid_entries, 1);

        assert_eq!(registry.clear(None).unwrap(), 2);
        assert!(registry.stats().iter().all(|s| s.total_entries == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_until_cancelled() {
        let (balances, _, registry) = registry();
        balances.insert("a".into(), 1);
        let parent = CancellationToken::new();
        let handle = spawn_maintenance(Arc::new(registry), Duration::from_secs(600), &parent);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(balances.len(), 0);

        parent.cancel();
        handle.shutdown().await;
    }
}
