//! Ecosystem aggregate cache (stale-while-revalidate)
//!
//! Reads never wait on the network: `stats()` always answers from the last
//! merged snapshot. A refresh marks the current snapshot stale, recomputes
//! balances, NFT counts and transactions through the batch collaborators,
//! then swaps the snapshot in. Concurrent refresh requests share a single
//! in-flight refresh.

use crate::balances::BalanceCache;
use crate::fetch::with_timeout;
use crate::monitor::PerformanceMonitor;
use crate::settings::{millis, secs, EcosystemSettings};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pecoin_core::{ActivityProvider, EntityKind, ParticipantDirectory, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on how soon a failed load is retried by readers
const FAILED_LOAD_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantActivity {
    pub name: String,
    pub wallet_address: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub balance: f64,
    pub nft_count: usize,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcosystemSnapshot {
    pub participants: Vec<ParticipantActivity>,
    pub total_balance: f64,
    pub total_nfts: usize,
    pub total_transactions: usize,
    /// Strictly increasing across snapshots
    pub last_update: DateTime<Utc>,
    /// Partial failures absorbed while building this snapshot
    pub errors: Vec<String>,
    #[serde(skip)]
    loaded_at: Instant,
}

impl EcosystemSnapshot {
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }
}

#[derive(Debug, Clone)]
pub enum EcosystemState {
    /// Nothing loaded yet; carries the error of a failed first load
    Empty { last_error: Option<String> },
    /// First load in progress
    Loading,
    Ready {
        snapshot: Arc<EcosystemSnapshot>,
        /// A refresh is running, or the last one failed
        stale: bool,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcosystemStats {
    pub total_participants: usize,
    pub total_balance: f64,
    pub total_nfts: usize,
    pub total_transactions: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub cache_age_ms: Option<u64>,
    pub loading: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct EcosystemCache {
    directory: Arc<dyn ParticipantDirectory>,
    balances: Arc<BalanceCache>,
    activity: Arc<dyn ActivityProvider>,
    mint: String,
    transaction_limit: usize,
    timeout: Duration,
    refresh_interval: Duration,
    state: RwLock<EcosystemState>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Completed refreshes, successful or not
    generation: AtomicU64,
    last_failure: RwLock<Option<Instant>>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl EcosystemCache {
    pub fn new(
        directory: Arc<dyn ParticipantDirectory>,
        balances: Arc<BalanceCache>,
        activity: Arc<dyn ActivityProvider>,
        settings: &EcosystemSettings,
    ) -> Self {
        Self {
            directory,
            balances,
            activity,
            mint: settings.mint.clone(),
            transaction_limit: settings.transaction_limit,
            timeout: millis(settings.timeout_ms),
            refresh_interval: secs(settings.refresh_interval_secs),
            state: RwLock::new(EcosystemState::Empty { last_error: None }),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last_failure: RwLock::new(None),
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn state(&self) -> EcosystemState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(EcosystemState::Empty { last_error: None })
    }

    pub fn snapshot(&self) -> Option<Arc<EcosystemSnapshot>> {
        match self.state() {
            EcosystemState::Ready { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    /// Current figures from the last merged snapshot; never waits
    pub fn stats(&self) -> EcosystemStats {
        match self.state() {
            EcosystemState::Empty { last_error } => EcosystemStats {
                error: last_error,
                ..Default::default()
            },
            EcosystemState::Loading => EcosystemStats {
                loading: true,
                ..Default::default()
            },
            EcosystemState::Ready {
                snapshot,
                stale,
                error,
            } => EcosystemStats {
                total_participants: snapshot.participants.len(),
                total_balance: snapshot.total_balance,
                total_nfts: snapshot.total_nfts,
                total_transactions: snapshot.total_transactions,
                last_update: Some(snapshot.last_update),
                cache_age_ms: Some(snapshot.age().as_millis() as u64),
                loading: false,
                stale,
                error,
            },
        }
    }

    /// [`stats`](Self::stats), kicking off a background refresh when the
    /// cache is empty or older than the refresh interval. After a failed
    /// load, retries wait out a short backoff.
    pub fn stats_revalidating(self: &Arc<Self>) -> EcosystemStats {
        let in_flight = self.refresh_lock.try_lock().is_err();
        let backing_off = self
            .last_failure
            .read()
            .ok()
            .and_then(|t| *t)
            .is_some_and(|t| t.elapsed() < FAILED_LOAD_BACKOFF.min(self.refresh_interval));

        let needs_refresh = !in_flight
            && !backing_off
            && match self.state() {
                EcosystemState::Empty { .. } | EcosystemState::Loading => true,
                EcosystemState::Ready { snapshot, error, .. } => {
                    error.is_some() || snapshot.age() >= self.refresh_interval
                }
            };
        if needs_refresh {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.refresh().await;
            });
        }
        self.stats()
    }

    /// Rebuild the snapshot. If a refresh is already running, wait for it
    /// and report its outcome instead of starting another.
    ///
    /// The work runs on its own task, so a caller that stops waiting does
    /// not abandon a half-finished refresh.
    pub async fn refresh(self: &Arc<Self>) -> EcosystemStats {
        let observed = self.generation.load(Ordering::SeqCst);
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.run_refresh(observed).await }).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Ecosystem refresh task failed: {}", e);
                self.stats()
            }
        }
    }

    async fn run_refresh(&self, observed: u64) -> EcosystemStats {
        let _guard = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != observed {
            debug!("Joined in-flight ecosystem refresh");
            return self.stats();
        }

        let previous = self.begin_refresh();
        let started = Instant::now();
        let result = match &self.monitor {
            Some(monitor) => {
                let id = monitor.operation_id("ecosystem_refresh");
                monitor
                    .measure_result(&id, "ecosystem_refresh", self.load_snapshot(previous))
                    .await
            }
            None => self.load_snapshot(previous).await,
        };

        match &result {
            Ok(snapshot) => info!(
                "Ecosystem refreshed in {}ms: {} participants, {} partial errors",
                started.elapsed().as_millis(),
                snapshot.participants.len(),
                snapshot.errors.len()
            ),
            Err(e) => warn!("Ecosystem refresh failed, serving previous snapshot: {}", e),
        }

        self.complete_refresh(result);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stats()
    }

    /// Periodic refresh until `cancel` fires; the first tick runs at once
    pub fn spawn_auto_refresh(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Ecosystem auto refresh started (every {}s)",
                self.refresh_interval.as_secs()
            );
            let mut interval = tokio::time::interval(self.refresh_interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Ecosystem auto refresh cancelled, exiting");
                        break;
                    }
                    _ = interval.tick() => {
                        self.refresh().await;
                    }
                }
            }
        })
    }

    /// Mark the state as refreshing; returns the last update time to beat
    fn begin_refresh(&self) -> Option<DateTime<Utc>> {
        let Ok(mut state) = self.state.write() else {
            return None;
        };
        let current = mem::replace(&mut *state, EcosystemState::Loading);
        let (next, previous) = match current {
            EcosystemState::Ready {
                snapshot, error, ..
            } => {
                let last = snapshot.last_update;
                (
                    EcosystemState::Ready {
                        snapshot,
                        stale: true,
                        error,
                    },
                    Some(last),
                )
            }
            EcosystemState::Empty { .. } | EcosystemState::Loading => {
                (EcosystemState::Loading, None)
            }
        };
        *state = next;
        previous
    }

    fn complete_refresh(&self, result: Result<EcosystemSnapshot>) {
        if let Ok(mut last_failure) = self.last_failure.write() {
            *last_failure = result.is_err().then(Instant::now);
        }
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let current = mem::replace(&mut *state, EcosystemState::Loading);
        *state = match (result, current) {
            (Ok(snapshot), _) => EcosystemState::Ready {
                snapshot: Arc::new(snapshot),
                stale: false,
                error: None,
            },
            (Err(e), EcosystemState::Ready { snapshot, .. }) => EcosystemState::Ready {
                snapshot,
                stale: true,
                error: Some(e.to_string()),
            },
            (Err(e), _) => EcosystemState::Empty {
                last_error: Some(e.to_string()),
            },
        };
    }

    async fn load_snapshot(&self, previous: Option<DateTime<Utc>>) -> Result<EcosystemSnapshot> {
        let participants = with_timeout(
            "ecosystem_participants",
            self.timeout,
            self.directory.list_all_participants(),
        )
        .await?;

        let mut seen = HashSet::new();
        let wallets: Vec<String> = participants
            .iter()
            .filter(|p| seen.insert(p.wallet_address.as_str()))
            .map(|p| p.wallet_address.clone())
            .collect();

        let mut errors = Vec::new();
        let (balances, nfts, transactions) = if wallets.is_empty() {
            Default::default()
        } else {
            let (balances, nfts, transactions) = tokio::join!(
                self.balances.get_balances(&wallets, &self.mint),
                with_timeout("ecosystem_nfts", self.timeout, self.activity.batch_nfts(&wallets)),
                with_timeout(
                    "ecosystem_transactions",
                    self.timeout,
                    self.activity.batch_transactions(&wallets, self.transaction_limit),
                ),
            );

            let balances = match balances {
                Ok(lookup) => {
                    if let Some(e) = &lookup.error {
                        errors.push(format!("balances: {}", e));
                    }
                    lookup.balances
                }
                Err(e) => {
                    errors.push(format!("balances: {}", e));
                    Default::default()
                }
            };
            let nfts = nfts.unwrap_or_else(|e| {
                errors.push(format!("nfts: {}", e));
                Default::default()
            });
            let transactions = transactions.unwrap_or_else(|e| {
                errors.push(format!("transactions: {}", e));
                Default::default()
            });
            (balances, nfts, transactions)
        };

        let activity: Vec<ParticipantActivity> = participants
            .into_iter()
            .map(|p| {
                let wallet = p.wallet_address.as_str();
                ParticipantActivity {
                    balance: balances.get(wallet).copied().unwrap_or(0.0),
                    nft_count: nfts.get(wallet).map_or(0, Vec::len),
                    transaction_count: transactions.get(wallet).map_or(0, Vec::len),
                    name: p.name,
                    wallet_address: p.wallet_address,
                    kind: p.kind,
                }
            })
            .collect();

        // Participants sharing a wallet are counted once in the totals
        let mut counted = HashSet::new();
        let (mut total_balance, mut total_nfts, mut total_transactions) = (0.0, 0, 0);
        for a in activity.iter().filter(|a| counted.insert(a.wallet_address.as_str())) {
            total_balance += a.balance;
            total_nfts += a.nft_count;
            total_transactions += a.transaction_count;
        }

        let mut last_update = Utc::now();
        if let Some(previous) = previous {
            if last_update <= previous {
                last_update = previous + ChronoDuration::milliseconds(1);
            }
        }

        Ok(EcosystemSnapshot {
            participants: activity,
            total_balance,
            total_nfts,
            total_transactions,
            last_update,
            errors,
            loaded_at: Instant::now(),
        })
    }
}
