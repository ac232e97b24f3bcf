//! Tunables for every cache, with the production defaults

use pecoin_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceCacheSettings {
    /// Balances are volatile; keep staleness short
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub timeout_ms: u64,
    /// Largest accepted request, in distinct wallets
    pub max_batch: usize,
}

impl Default for BalanceCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 120,
            max_entries: 5_000,
            timeout_ms: 5_000,
            max_batch: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignedUrlSettings {
    /// How long we reuse a signed URL
    pub cache_ttl_secs: u64,
    /// Lifetime requested from the signer; must exceed `cache_ttl_secs`
    pub url_expiry_secs: u64,
    pub max_entries: usize,
    pub timeout_ms: u64,
}

impl Default for SignedUrlSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 6 * 60 * 60,
            url_expiry_secs: 7 * 24 * 60 * 60,
            max_entries: 500,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Larger payloads are served but never cached
    pub max_cacheable_bytes: usize,
    /// Downloads beyond this size are abandoned
    pub max_download_bytes: usize,
    pub timeout_ms: u64,
}

impl Default for ImageCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            max_entries: 100,
            max_cacheable_bytes: 2 * 1024 * 1024,
            max_download_bytes: 10 * 1024 * 1024,
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameResolverSettings {
    pub snapshot_ttl_secs: u64,
    pub lookup_ttl_secs: u64,
    pub max_entries: usize,
    pub timeout_ms: u64,
}

impl Default for NameResolverSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 5 * 60,
            lookup_ttl_secs: 5 * 60,
            max_entries: 2_000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemSettings {
    /// Token mint whose balances are aggregated
    pub mint: String,
    pub refresh_interval_secs: u64,
    /// Recent signatures fetched per participant
    pub transaction_limit: usize,
    pub timeout_ms: u64,
}

impl Default for EcosystemSettings {
    fn default() -> Self {
        Self {
            mint: String::new(),
            refresh_interval_secs: 5 * 60,
            transaction_limit: 10,
            timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub history_capacity: usize,
    pub slow_threshold_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            history_capacity: crate::monitor::DEFAULT_HISTORY_CAPACITY,
            slow_threshold_ms: 2_000,
        }
    }
}

/// All cache tunables, as they appear under `[caches]` in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub balances: BalanceCacheSettings,
    pub signed_urls: SignedUrlSettings,
    pub images: ImageCacheSettings,
    pub names: NameResolverSettings,
    pub ecosystem: EcosystemSettings,
    pub monitor: MonitorSettings,
    /// Period of the expired-entry sweep
    pub sweep_interval_secs: u64,
}

pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

pub fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl CacheSettings {
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("balances.ttl_secs", self.balances.ttl_secs),
            ("signed_urls.cache_ttl_secs", self.signed_urls.cache_ttl_secs),
            ("images.ttl_secs", self.images.ttl_secs),
            ("names.snapshot_ttl_secs", self.names.snapshot_ttl_secs),
            ("names.lookup_ttl_secs", self.names.lookup_ttl_secs),
            ("ecosystem.refresh_interval_secs", self.ecosystem.refresh_interval_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, v)| *v == 0) {
            return Err(Error::ConfigError(format!("{} must be greater than zero", name)));
        }

        if self.signed_urls.cache_ttl_secs >= self.signed_urls.url_expiry_secs {
            return Err(Error::ConfigError(
                "signed_urls.cache_ttl_secs must be shorter than url_expiry_secs".to_string(),
            ));
        }

        if self.images.max_download_bytes < self.images.max_cacheable_bytes {
            return Err(Error::ConfigError(
                "images.max_download_bytes must be at least max_cacheable_bytes".into(),
            ));
        }

        if self.balances.max_batch == 0 {
            return Err(Error::ConfigError("balances.max_batch must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        if self.sweep_interval_secs == 0 {
            Duration::from_secs(600)
        } else {
            secs(self.sweep_interval_secs)
        }
    }
}
