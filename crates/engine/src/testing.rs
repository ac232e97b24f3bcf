//! In-memory collaborators with call counters, shared by the cache tests

use async_trait::async_trait;
use bytes::Bytes;
use pecoin_core::{
    ActivityProvider, BalanceProvider, EntityKind, Error, FetchedImage, ImageOrigin, NftAsset,
    Participant, ParticipantDirectory, Result, TransactionSummary, UrlSigner,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakeBalances {
    pub token: Mutex<HashMap<String, f64>>,
    pub native: Mutex<HashMap<String, f64>>,
    /// Wallet lists of every batch call, in order
    pub token_calls: Mutex<Vec<Vec<String>>>,
    pub native_calls: Mutex<Vec<Vec<String>>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeBalances {
    pub fn with_tokens(balances: &[(&str, f64)]) -> Self {
        let fake = Self::default();
        for (wallet, amount) in balances {
            fake.token.lock().unwrap().insert(wallet.to_string(), *amount);
        }
        fake
    }

    pub fn set_token(&self, wallet: &str, amount: f64) {
        self.token.lock().unwrap().insert(wallet.to_string(), amount);
    }

    pub fn set_native(&self, wallet: &str, amount: f64) {
        self.native.lock().unwrap().insert(wallet.to_string(), amount);
    }

    pub fn token_calls(&self) -> Vec<Vec<String>> {
        self.token_calls.lock().unwrap().clone()
    }

    pub fn native_calls(&self) -> Vec<Vec<String>> {
        self.native_calls.lock().unwrap().clone()
    }

    async fn answer(
        &self,
        source: &Mutex<HashMap<String, f64>>,
        wallets: &[String],
    ) -> Result<HashMap<String, f64>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::NetworkError("rpc unavailable".into()));
        }
        let source = source.lock().unwrap();
        Ok(wallets
            .iter()
            .filter_map(|w| source.get(w).map(|b| (w.clone(), *b)))
            .collect())
    }
}

#[async_trait]
impl BalanceProvider for FakeBalances {
    async fn batch_token_balances(
        &self,
        wallets: &[String],
        _mint: &str,
    ) -> Result<HashMap<String, f64>> {
        self.token_calls.lock().unwrap().push(wallets.to_vec());
        self.answer(&self.token, wallets).await
    }

    async fn batch_native_balances(&self, wallets: &[String]) -> Result<HashMap<String, f64>> {
        self.native_calls.lock().unwrap().push(wallets.to_vec());
        self.answer(&self.native, wallets).await
    }
}

#[derive(Default)]
pub struct FakeSigner {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeSigner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ApiError("storage unavailable".into()));
        }
        Ok(format!(
            "https://storage.test/{}?token=t{}&expires={}",
            path,
            n,
            expires_in.as_secs()
        ))
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub images: Mutex<HashMap<String, FetchedImage>>,
    pub calls: AtomicUsize,
}

impl FakeImages {
    pub fn serve(&self, url: &str, content_type: &str, len: usize) {
        self.images.lock().unwrap().insert(
            url.to_string(),
            FetchedImage {
                bytes: Bytes::from(vec![7u8; len]),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageOrigin for FakeImages {
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ApiError(format!("404 for {}", url)))
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub participants: Mutex<Vec<Participant>>,
    /// Calls to `list_participants`, one per kind per snapshot load
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeDirectory {
    pub fn with(participants: &[(&str, &str, EntityKind)]) -> Self {
        let fake = Self::default();
        for (name, wallet, kind) in participants {
            fake.add(name, wallet, *kind);
        }
        fake
    }

    pub fn add(&self, name: &str, wallet: &str, kind: EntityKind) {
        self.participants.lock().unwrap().push(Participant {
            name: name.to_string(),
            wallet_address: wallet.to_string(),
            kind,
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParticipantDirectory for FakeDirectory {
    async fn list_participants(&self, kind: EntityKind) -> Result<Vec<Participant>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::DatabaseError("database is locked".into()));
        }
        Ok(self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.kind == kind)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeActivity {
    pub nft_calls: AtomicUsize,
    pub tx_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeActivity {
    pub fn nft_calls(&self) -> usize {
        self.nft_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ActivityProvider for FakeActivity {
    async fn batch_nfts(&self, wallets: &[String]) -> Result<HashMap<String, Vec<NftAsset>>> {
        self.nft_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::NetworkError("das unavailable".into()));
        }
        // Every wallet holds one NFT
        Ok(wallets
            .iter()
            .map(|w| {
                let asset = NftAsset {
                    id: format!("asset-{}", w),
                    name: "Badge".into(),
                    image: None,
                    collection: None,
                    compressed: false,
                };
                (w.clone(), vec![asset])
            })
            .collect())
    }

    async fn batch_transactions(
        &self,
        wallets: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<TransactionSummary>>> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::NetworkError("rpc unavailable".into()));
        }
        // Two transactions per wallet
        Ok(wallets
            .iter()
            .map(|w| {
                let txs = (0..2.min(limit as u64))
                    .map(|i| TransactionSummary {
                        signature: format!("{}-sig-{}", w, i),
                        slot: 100 + i,
                        block_time: None,
                        success: true,
                        memo: None,
                    })
                    .collect();
                (w.clone(), txs)
            })
            .collect())
    }
}
