//! Image byte cache for the image proxy endpoint

use crate::fetch::with_timeout;
use crate::monitor::PerformanceMonitor;
use crate::settings::{millis, secs, ImageCacheSettings};
use bytes::Bytes;
use pecoin_core::{Error, FetchedImage, ImageOrigin, Result};
use pecoin_persistence::{ManagedCache, TtlCache};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Served whenever the origin fails or returns something that is not an image
pub const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">"##,
    r##"<rect width="200" height="200" fill="#e5e7eb"/>"##,
    r##"<text x="100" y="108" font-family="sans-serif" font-size="16" fill="#9ca3af" "##,
    r##"text-anchor="middle">No image</text></svg>"##
);

pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Cache,
    Origin,
    Placeholder,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageSource::Cache => "HIT",
            ImageSource::Origin => "MISS",
            ImageSource::Placeholder => "PLACEHOLDER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ServedImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub source: ImageSource,
}

impl ServedImage {
    fn placeholder() -> Self {
        Self {
            bytes: Bytes::from_static(PLACEHOLDER_SVG.as_bytes()),
            content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
            source: ImageSource::Placeholder,
        }
    }

    fn from_fetched(image: FetchedImage, source: ImageSource) -> Self {
        Self {
            bytes: image.bytes,
            content_type: image.content_type,
            source,
        }
    }
}

/// FIFO-evicting cache of small images. Images at a URL are assumed
/// immutable, so entries only leave by TTL or eviction.
pub struct ImageCache {
    origin: Arc<dyn ImageOrigin>,
    cache: Arc<TtlCache<String, FetchedImage>>,
    max_cacheable_bytes: usize,
    timeout: Duration,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl ImageCache {
    pub fn new(origin: Arc<dyn ImageOrigin>, settings: &ImageCacheSettings) -> Self {
        Self {
            origin,
            cache: Arc::new(TtlCache::new(
                "images",
                secs(settings.ttl_secs),
                settings.max_entries,
            )),
            max_cacheable_bytes: settings.max_cacheable_bytes,
            timeout: millis(settings.timeout_ms),
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Cached image, fresh download, or placeholder.
    ///
    /// Only a malformed `url` is an error.
    pub async fn load(&self, url: &str) -> Result<ServedImage> {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            return Err(Error::ValidationError(
                "url must be an absolute http(s) URL".to_string(),
            ));
        }

        if let Some(image) = self.cache.get(url) {
            return Ok(ServedImage::from_fetched(image, ImageSource::Cache));
        }

        let request = with_timeout("image_download", self.timeout, self.origin.fetch_image(url));
        let result = match &self.monitor {
            Some(monitor) => {
                let id = monitor.operation_id("image");
                monitor.measure_result(&id, "image", request).await
            }
            None => request.await,
        };

        let image = match result {
            Ok(image) if image.is_image() => image,
            Ok(image) => {
                warn!("Origin returned {} instead of an image", image.content_type);
                return Ok(ServedImage::placeholder());
            }
            Err(e) => {
                warn!("Image download failed: {}", e);
                return Ok(ServedImage::placeholder());
            }
        };

        if image.len() < self.max_cacheable_bytes {
            self.cache.insert(url.to_string(), image.clone());
        } else {
            debug!("Image of {} bytes is too large to cache", image.len());
        }
        Ok(ServedImage::from_fetched(image, ImageSource::Origin))
    }

    pub fn cache(&self) -> Arc<dyn ManagedCache> {
        self.cache.clone()
    }
}
