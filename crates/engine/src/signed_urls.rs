//! Signed-URL cache for private storage objects (logos, avatars)
//!
//! Signed URLs are requested with a long expiry and cached for a shorter
//! window, so a cached URL is always still valid when served. Signing
//! failures are never cached.

use crate::fetch::with_timeout;
use crate::monitor::PerformanceMonitor;
use crate::settings::{millis, secs, SignedUrlSettings};
use futures::future::join_all;
use pecoin_core::UrlSigner;
use pecoin_persistence::{ManagedCache, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Keys that are already URLs are served as-is
pub fn is_absolute_url(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

pub struct SignedUrlCache {
    signer: Arc<dyn UrlSigner>,
    cache: Arc<TtlCache<String, String>>,
    url_expiry: Duration,
    timeout: Duration,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl SignedUrlCache {
    pub fn new(signer: Arc<dyn UrlSigner>, settings: &SignedUrlSettings) -> Self {
        Self {
            signer,
            cache: Arc::new(TtlCache::new(
                "signed_urls",
                secs(settings.cache_ttl_secs),
                settings.max_entries,
            )),
            url_expiry: secs(settings.url_expiry_secs),
            timeout: millis(settings.timeout_ms),
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Readable URL for `key`, or `None` if it could not be signed
    pub async fn get_signed_url(&self, key: &str) -> Option<String> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        if is_absolute_url(key) {
            return Some(key.to_string());
        }
        if let Some(url) = self.cache.get(key) {
            return Some(url);
        }

        let request = with_timeout(
            "create_signed_url",
            self.timeout,
            self.signer.create_signed_url(key, self.url_expiry),
        );
        let result = match &self.monitor {
            Some(monitor) => {
                let id = monitor.operation_id("signed_url");
                monitor.measure_result(&id, "signed_url", request).await
            }
            None => request.await,
        };

        match result {
            Ok(url) => {
                debug!("Signed {}", key);
                self.cache.insert(key.to_string(), url.clone());
                Some(url)
            }
            Err(e) => {
                warn!("Failed to sign storage key {}: {}", key, e);
                None
            }
        }
    }

    /// Sign many keys concurrently; output order matches `keys`
    pub async fn get_signed_urls(&self, keys: &[String]) -> Vec<Option<String>> {
        join_all(keys.iter().map(|key| self.get_signed_url(key))).await
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.invalidate(key.trim())
    }

    /// Called after an object was overwritten: drop the old URL, then sign
    /// the new object.
    pub async fn refresh_after_upload(&self, key: &str) -> Option<String> {
        self.invalidate(key);
        self.get_signed_url(key).await
    }

    pub fn cache(&self) -> Arc<dyn ManagedCache> {
        self.cache.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSigner;
    use std::sync::atomic::Ordering;
    use tokio::time::advance;

    fn setup() -> (Arc<FakeSigner>, SignedUrlCache) {
        let signer = Arc::new(FakeSigner::default());
        let cache = SignedUrlCache::new(signer.clone(), &SignedUrlSettings::default());
        (signer, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_url_cached_until_ttl() {
        let (signer, cache) = setup();

        let first = cache.get_signed_url("logos/team-1.png").await.unwrap();
        assert!(first.contains("expires=604800"));

        advance(Duration::from_secs(6 * 60 * 60 - 1)).await;
        assert_eq!(cache.get_signed_url("logos/team-1.png").await.unwrap(), first);
        assert_eq!(signer.calls(), 1);

        advance(Duration::from_secs(1)).await;
        let renewed = cache.get_signed_url("logos/team-1.png").await.unwrap();
        assert_ne!(renewed, first);
        assert_eq!(signer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_url_passes_through_uncached() {
        let (signer, cache) = setup();
        let url = "https://cdn.example.com/a.png";
        assert_eq!(cache.get_signed_url(url).await.as_deref(), Some(url));
        assert_eq!(signer.calls(), 0);
        assert_eq!(cache.cache().stats().total_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_new_signature() {
        let (signer, cache) = setup();
        let before = cache.get_signed_url("avatars/1.png").await.unwrap();

        let after = cache.refresh_after_upload("avatars/1.png").await.unwrap();

        assert_ne!(before, after);
        assert_eq!(signer.calls(), 2);
        assert_eq!(cache.get_signed_url("avatars/1.png").await.unwrap(), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_errors_are_not_cached() {
        let (signer, cache) = setup();
        signer.fail.store(true, Ordering::SeqCst);
        assert!(cache.get_signed_url("logos/x.png").await.is_none());

        signer.fail.store(false, Ordering::SeqCst);
        assert!(cache.get_signed_url("logos/x.png").await.is_some());
        assert_eq!(signer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_order_and_nulls() {
        let (_signer, cache) = setup();
        let keys = vec![
            "logos/a.png".to_string(),
            "".to_string(),
            "https://x.test/b.png".to_string(),
        ];

        let urls = cache.get_signed_urls(&keys).await;

        assert_eq!(urls.len(), 3);
        assert!(urls[0].as_deref().unwrap().contains("logos/a.png"));
        assert!(urls[1].is_none());
        assert_eq!(urls[2].as_deref(), Some("https://x.test/b.png"));
    }
}
