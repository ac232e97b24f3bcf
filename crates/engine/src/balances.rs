//! Balance cache: serves fresh entries from memory and batches every miss
//! into a single provider call.
//!
//! Token balances are keyed by (wallet, mint); native balances by wallet.
//! Both follow the same split / fetch / merge sequence. Fetch failures
//! never escape: the affected wallets read as `0.0`, are listed in
//! `failed`, and the error text is attached to the lookup.

use crate::fetch::with_timeout;
use crate::monitor::{Backend, PerformanceMonitor};
use crate::settings::{millis, secs, BalanceCacheSettings};
use pecoin_core::{BalanceLookup, BalanceProvider, Error, Result, WalletKey};
use pecoin_persistence::{ManagedCache, TtlCache};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct BalanceCache {
    provider: Arc<dyn BalanceProvider>,
    tokens: Arc<TtlCache<WalletKey, f64>>,
    native: Arc<TtlCache<String, f64>>,
    timeout: Duration,
    max_batch: usize,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl BalanceCache {
    pub fn new(provider: Arc<dyn BalanceProvider>, settings: &BalanceCacheSettings) -> Self {
        let ttl = secs(settings.ttl_secs);
        Self {
            provider,
            tokens: Arc::new(TtlCache::new("balances", ttl, settings.max_entries)),
            native: Arc::new(TtlCache::new("native_balances", ttl, settings.max_entries)),
            timeout: millis(settings.timeout_ms),
            max_batch: settings.max_batch,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Balance of `mint` for every distinct wallet in `wallets`.
    ///
    /// Errors only on invalid input; provider failures are reported inside
    /// the returned lookup.
    pub async fn get_balances(&self, wallets: &[String], mint: &str) -> Result<BalanceLookup> {
        let mint = mint.trim();
        if mint.is_empty() {
            return Err(Error::ValidationError("mint is required".to_string()));
        }
        let wallets = self.validate(wallets)?;

        let (mut lookup, to_fetch) =
            split_cached(wallets, |w| self.tokens.get(&WalletKey::new(w, mint)));
        if to_fetch.is_empty() {
            return Ok(lookup);
        }

        let result = self
            .fetch(
                "token_balances",
                to_fetch.len(),
                self.provider.batch_token_balances(&to_fetch, mint),
            )
            .await;

        merge_fetched(&mut lookup, to_fetch, result, |w, balance| {
            self.tokens.insert(WalletKey::new(w, mint), balance)
        });
        Ok(lookup)
    }

    /// Native SOL balance for every distinct wallet in `wallets`
    pub async fn get_native_balances(&self, wallets: &[String]) -> Result<BalanceLookup> {
        let wallets = self.validate(wallets)?;

        let (mut lookup, to_fetch) = split_cached(wallets, |w| self.native.get(w));
        if to_fetch.is_empty() {
            return Ok(lookup);
        }

        let result = self
            .fetch(
                "native_balances",
                to_fetch.len(),
                self.provider.batch_native_balances(&to_fetch),
            )
            .await;

        merge_fetched(&mut lookup, to_fetch, result, |w, balance| {
            self.native.insert(w.to_string(), balance)
        });
        Ok(lookup)
    }

    /// Drop every cached balance of `mint`
    pub fn invalidate_mint(&self, mint: &str) -> usize {
        self.tokens.invalidate_where(|key| key.mint == mint)
    }

    pub fn invalidate_wallet(&self, wallet: &str) -> usize {
        let removed = self.tokens.invalidate_where(|key| key.wallet == wallet);
        removed + usize::from(self.native.invalidate(wallet))
    }

    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        let tokens: Arc<dyn ManagedCache> = self.tokens.clone();
        let native: Arc<dyn ManagedCache> = self.native.clone();
        vec![tokens, native]
    }

    /// Trimmed, de-duplicated wallets in first-seen order
    fn validate(&self, wallets: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::with_capacity(wallets.len());
        let mut unique = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            let wallet = wallet.trim();
            if wallet.is_empty() {
                return Err(Error::ValidationError(
                    "wallet addresses must not be empty".to_string(),
                ));
            }
            if seen.insert(wallet) {
                unique.push(wallet.to_string());
            }
        }

        if unique.len() > self.max_batch {
            return Err(Error::ValidationError(format!(
                "too many wallets: {} (max {})",
                unique.len(),
                self.max_batch
            )));
        }
        Ok(unique)
    }

    async fn fetch<F>(
        &self,
        label: &'static str,
        count: usize,
        request: F,
    ) -> Result<HashMap<String, f64>>
    where
        F: Future<Output = Result<HashMap<String, f64>>>,
    {
        let started = Instant::now();
        let bounded = with_timeout(label, self.timeout, request);

        let result = match &self.monitor {
            Some(monitor) => {
                let id = monitor.operation_id(label);
                monitor.measure_result(&id, label, bounded).await
            }
            None => bounded.await,
        };

        if let Some(monitor) = &self.monitor {
            monitor.record_api_call(Backend::External, result.is_ok(), started.elapsed());
        }

        match &result {
            Ok(found) => debug!("Fetched {} of {} {}", found.len(), count, label),
            Err(e) => warn!("Batch {} fetch for {} wallets failed: {}", label, count, e),
        }
        result
    }
}

/// Serve what the cache has; return the rest as the fetch list
fn split_cached<F>(wallets: Vec<String>, mut cached: F) -> (BalanceLookup, Vec<String>)
where
    F: FnMut(&str) -> Option<f64>,
{
    let mut lookup = BalanceLookup::default();
    let mut to_fetch = Vec::new();

    for wallet in wallets {
        match cached(&wallet) {
            Some(balance) => {
                lookup.cache_hits += 1;
                lookup.balances.insert(wallet, balance);
            }
            None => to_fetch.push(wallet),
        }
    }
    (lookup, to_fetch)
}

/// Fold a batch result into `lookup`. Only values the provider actually
/// returned are cached; everything else reads as zero.
fn merge_fetched<F>(
    lookup: &mut BalanceLookup,
    to_fetch: Vec<String>,
    result: Result<HashMap<String, f64>>,
    mut store: F,
) where
    F: FnMut(&str, f64),
{
    match result {
        Ok(fetched) => {
            for wallet in to_fetch {
                match fetched.get(&wallet) {
                    Some(&balance) => {
                        store(&wallet, balance);
                        lookup.fetched += 1;
                        lookup.balances.insert(wallet, balance);
                    }
                    None => {
                        lookup.balances.insert(wallet.clone(), 0.0);
                        lookup.failed.push(wallet);
                    }
                }
            }
        }
        Err(e) => {
            lookup.error = Some(e.to_string());
            for wallet in to_fetch {
                lookup.balances.insert(wallet.clone(), 0.0);
                lookup.failed.push(wallet);
            }
        }
    }
}
