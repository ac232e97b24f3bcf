//! Wallet address to display name resolution for activity views.
//!
//! Two tiers: a full participant snapshot reloaded at most once per TTL,
//! and a per-wallet result cache. A wallet that is absent from a non-empty
//! snapshot is cached as a negative result; when the snapshot is empty
//! (store not reachable yet) nothing is cached.

use crate::fetch::with_timeout;
use crate::settings::{millis, secs, NameResolverSettings};
use pecoin_core::{EntityKind, Participant, ParticipantDirectory};
use pecoin_persistence::{ManagedCache, TtlCache};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Placeholder the protocol layer uses when no wallet is known
const UNKNOWN_SENTINEL: &str = "Unknown";

/// Upper bound on how soon a failed snapshot load is retried
const FAILED_LOAD_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedName {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub short_address: String,
}

/// `first4...last4` for addresses longer than 12 characters
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn is_unknown(wallet: &str) -> bool {
    wallet == UNKNOWN_SENTINEL || wallet.contains("Unknown/")
}

struct Snapshot {
    by_wallet: HashMap<String, Participant>,
}

#[derive(Default)]
struct SnapshotSlot {
    current: Option<Snapshot>,
    /// When the last load finished and whether it succeeded
    last_attempt: Option<(Instant, bool)>,
}

impl SnapshotSlot {
    fn due(&self, ttl: Duration) -> bool {
        match self.last_attempt {
            None => true,
            Some((at, true)) => at.elapsed() >= ttl,
            Some((at, false)) => at.elapsed() >= FAILED_LOAD_BACKOFF.min(ttl),
        }
    }
}

pub struct NameResolver {
    directory: Arc<dyn ParticipantDirectory>,
    snapshot: Mutex<SnapshotSlot>,
    snapshot_ttl: Duration,
    lookups: Arc<TtlCache<String, Option<ResolvedName>>>,
    timeout: Duration,
}

impl NameResolver {
    pub fn new(directory: Arc<dyn ParticipantDirectory>, settings: &NameResolverSettings) -> Self {
        Self {
            directory,
            snapshot: Mutex::new(SnapshotSlot::default()),
            snapshot_ttl: secs(settings.snapshot_ttl_secs),
            lookups: Arc::new(TtlCache::new(
                "wallet_names",
                secs(settings.lookup_ttl_secs),
                settings.max_entries,
            )),
            timeout: millis(settings.timeout_ms),
        }
    }

    pub async fn resolve(&self, wallet: &str) -> Option<ResolvedName> {
        let wallet = wallet.trim();
        if wallet.is_empty() || is_unknown(wallet) {
            return None;
        }
        if let Some(cached) = self.lookups.get(wallet) {
            return cached;
        }

        let (resolved, snapshot_empty) = {
            let slot = self.fresh_snapshot().await;
            match slot.current.as_ref() {
                Some(s) => (
                    s.by_wallet.get(wallet).map(|p| ResolvedName {
                        name: p.name.clone(),
                        kind: p.kind,
                        short_address: format_address(wallet),
                    }),
                    s.by_wallet.is_empty(),
                ),
                None => (None, true),
            }
        };

        if resolved.is_some() || !snapshot_empty {
            self.lookups.insert(wallet.to_string(), resolved.clone());
        }
        resolved
    }

    /// Resolve several wallets against one snapshot; unknown wallets are
    /// left out of the result.
    pub async fn resolve_many(&self, wallets: &[String]) -> HashMap<String, ResolvedName> {
        let mut names = HashMap::new();
        for wallet in wallets {
            if names.contains_key(wallet) {
                continue;
            }
            if let Some(name) = self.resolve(wallet).await {
                names.insert(wallet.clone(), name);
            }
        }
        names
    }

    /// Drop both tiers; the next lookup reloads the snapshot
    pub async fn clear_cache(&self) {
        self.lookups.clear();
        *self.snapshot.lock().await = SnapshotSlot::default();
        info!("Wallet name cache cleared");
    }

    pub fn cache(&self) -> Arc<dyn ManagedCache> {
        self.lookups.clone()
    }

    /// The lock is held across the reload so concurrent lookups share it.
    /// A failed load is not retried until the backoff passes; until then
    /// the previous snapshot (if any) keeps serving.
    async fn fresh_snapshot(&self) -> MutexGuard<'_, SnapshotSlot> {
        let mut guard = self.snapshot.lock().await;
        if !guard.due(self.snapshot_ttl) {
            return guard;
        }

        let load = with_timeout(
            "participant_snapshot",
            self.timeout,
            self.directory.list_all_participants(),
        );
        match load.await {
            Ok(participants) => {
                debug!("Loaded {} participants", participants.len());
                // First listed wins when a wallet appears under several kinds
                let mut by_wallet = HashMap::new();
                for p in participants {
                    by_wallet.entry(p.wallet_address.clone()).or_insert(p);
                }
                guard.current = Some(Snapshot { by_wallet });
                guard.last_attempt = Some((Instant::now(), true));
            }
            Err(e) => {
                warn!("Failed to load participant snapshot, keeping previous: {}", e);
                guard.last_attempt = Some((Instant::now(), false));
            }
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDirectory;
    use std::sync::atomic::Ordering;
    use tokio::time::advance;

    const ALICE: &str = "A1iceWa11et000000000000000000000000000000001";
    const NOBODY: &str = "NobodyWa11et0000000000000000000000000000009";

    fn setup(fake: FakeDirectory) -> (Arc<FakeDirectory>, NameResolver) {
        let fake = Arc::new(fake);
        let resolver = NameResolver::new(fake.clone(), &NameResolverSettings::default());
        (fake, resolver)
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(ALICE), "A1ic...0001");
        assert_eq!(format_address("short"), "short");
        assert_eq!(format_address("exactly12chr"), "exactly12chr");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sentinel_short_circuits() {
        let (fake, resolver) = setup(FakeDirectory::with(&[("Alice", ALICE, EntityKind::Team)]));
        assert!(resolver.resolve("Unknown").await.is_none());
        assert!(resolver.resolve("Unknown/pending").await.is_none());
        assert_eq!(fake.calls(), 0);
        assert_eq!(resolver.cache().stats().total_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_loaded_once_per_ttl() {
        let (fake, resolver) = setup(FakeDirectory::with(&[
            ("Alice", ALICE, EntityKind::Team),
            ("Bob", "BobWa11et", EntityKind::Staff),
        ]));

        let alice = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.kind, EntityKind::Team);
        assert_eq!(alice.short_address, "A1ic...0001");
        let bob = resolver.resolve("BobWa11et").await.unwrap();
        assert_eq!(bob.short_address, "BobWa11et");

        // One snapshot load queries every kind once
        assert_eq!(fake.calls(), EntityKind::ALL.len());

        // A wallet seen for the first time inside the window reuses the snapshot
        fake.add("Carol", "CarolWa11et", EntityKind::Startup);
        advance(Duration::from_secs(5 * 60 - 1)).await;
        assert!(resolver.resolve("CarolWa11et").await.is_none());
        assert_eq!(fake.calls(), EntityKind::ALL.len());

        // Past the window the next new wallet triggers exactly one reload
        fake.add("Dave", "DaveWa11et", EntityKind::Staff);
        advance(Duration::from_secs(1)).await;
        assert_eq!(resolver.resolve("DaveWa11et").await.unwrap().name, "Dave");
        assert_eq!(resolver.resolve(NOBODY).await, None);
        assert_eq!(fake.calls(), 2 * EntityKind::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_is_not_retried_per_lookup() {
        let (fake, resolver) = setup(FakeDirectory::with(&[("Alice", ALICE, EntityKind::Team)]));
        resolver.resolve(ALICE).await.unwrap();
        let loaded = fake.calls();

        advance(Duration::from_secs(5 * 60 + 1)).await;
        fake.fail.store(true, Ordering::SeqCst);
        for i in 0..10 {
            resolver.resolve(&format!("Stranger{}", i)).await;
        }
        // One failed attempt (the first kind errors out), then backoff
        assert_eq!(fake.calls(), loaded + 1);
        assert_eq!(resolver.resolve(ALICE).await.unwrap().name, "Alice");

        fake.fail.store(false, Ordering::SeqCst);
        advance(FAILED_LOAD_BACKOFF).await;
        resolver.resolve("Stranger99").await;
        assert_eq!(fake.calls(), loaded + 1 + EntityKind::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_listed_participant_wins_shared_wallet() {
        let (_fake, resolver) = setup(FakeDirectory::with(&[
            ("Alpha Team", ALICE, EntityKind::Team),
            ("Alice", ALICE, EntityKind::Staff),
        ]));
        let name = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(name.name, "Alpha Team");
        assert_eq!(name.kind, EntityKind::Team);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_wallet_is_negatively_cached() {
        let (fake, resolver) = setup(FakeDirectory::with(&[("Alice", ALICE, EntityKind::Team)]));
        assert!(resolver.resolve(NOBODY).await.is_none());

        // Joins later, but the negative result holds until it expires
        fake.add("Nobody", NOBODY, EntityKind::Startup);
        advance(Duration::from_secs(5 * 60 - 1)).await;
        assert!(resolver.resolve(NOBODY).await.is_none());
        assert_eq!(fake.calls(), EntityKind::ALL.len());

        advance(Duration::from_secs(1)).await;
        assert_eq!(resolver.resolve(NOBODY).await.unwrap().name, "Nobody");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_snapshot_results_are_not_cached() {
        let (fake, resolver) = setup(FakeDirectory::default());
        fake.fail.store(true, Ordering::SeqCst);
        assert!(resolver.resolve(ALICE).await.is_none());

        fake.fail.store(false, Ordering::SeqCst);
        fake.add("Alice", ALICE, EntityKind::Team);
        advance(FAILED_LOAD_BACKOFF).await;
        assert_eq!(resolver.resolve(ALICE).await.unwrap().name, "Alice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let (fake, resolver) = setup(FakeDirectory::with(&[("Alice", ALICE, EntityKind::Team)]));
        resolver.resolve(ALICE).await.unwrap();

        advance(Duration::from_secs(10 * 60)).await;
        fake.fail.store(true, Ordering::SeqCst);
        assert_eq!(resolver.resolve(ALICE).await.unwrap().name, "Alice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_many_skips_unknown() {
        let (_fake, resolver) =
            setup(FakeDirectory::with(&[("Alice", ALICE, EntityKind::Team)]));
        let wallets = vec![ALICE.to_string(), NOBODY.to_string(), "Unknown".to_string()];
        let names = resolver.resolve_many(&wallets).await;
        assert_eq!(names.len(), 1);
        assert_eq!(names[ALICE].name, "Alice");
    }
}
