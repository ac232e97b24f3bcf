//! Interfaces of the slow external collaborators the caches sit in front of.
//!
//! Concrete implementations live in `pecoin-networking` (RPC, storage,
//! image hosts) and `pecoin-persistence` (entity store). The engine only
//! depends on these traits, so tests substitute in-memory fakes.

use crate::{EntityKind, FetchedImage, NftAsset, Participant, Result, TransactionSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Source of ecosystem participants (the entity store)
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Every entity of `kind` that has a wallet address
    async fn list_participants(&self, kind: EntityKind) -> Result<Vec<Participant>>;

    /// All participants across every kind, teams first
    async fn list_all_participants(&self) -> Result<Vec<Participant>> {
        let mut all = Vec::new();
        for kind in EntityKind::ALL {
            all.extend(self.list_participants(kind).await?);
        }
        Ok(all)
    }
}

/// Batch balance lookups against the chain
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Balance of `mint` for each wallet, in UI units.
    ///
    /// One round trip for the whole batch. Wallets without a token account
    /// may be absent from the returned map.
    async fn batch_token_balances(
        &self,
        wallets: &[String],
        mint: &str,
    ) -> Result<HashMap<String, f64>>;

    /// Native (SOL) balance for each wallet, in SOL
    async fn batch_native_balances(&self, wallets: &[String]) -> Result<HashMap<String, f64>>;
}

/// NFT holdings and recent activity
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    async fn batch_nfts(&self, wallets: &[String]) -> Result<HashMap<String, Vec<NftAsset>>>;

    async fn batch_transactions(
        &self,
        wallets: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<TransactionSummary>>>;
}

/// Object storage that can issue time-limited read URLs
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String>;
}

/// Fetches image bytes from arbitrary origin hosts
#[async_trait]
pub trait ImageOrigin: Send + Sync {
    /// Fails for non-2xx responses; content type is returned unchecked
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage>;
}
