//! Solana JSON-RPC client (Helius-compatible, including DAS)
//!
//! Every batch operation is sent as a single JSON-RPC batch request, so a
//! lookup for N wallets costs one HTTP round trip.

mod types;

pub use types::*;

use crate::http::{build_http_client, ensure_success, redact_url, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use pecoin_core::{
    ActivityProvider, BalanceProvider, Error, Lamports, NftAsset, Result, TransactionSummary,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};

/// `getMultipleAccounts` accepts at most this many keys per call
const MAX_ACCOUNTS_PER_CALL: usize = 100;

/// Page size for `getAssetsByOwner`
const ASSET_PAGE_LIMIT: usize = 1000;

/// HTTP client for a Solana RPC endpoint
pub struct SolanaRpcClient {
    http: Client,
    endpoint: String,
}

impl SolanaRpcClient {
    /// The endpoint may carry an API key in its query string; it is never logged.
    pub fn new(endpoint: &str) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(Error::ConfigError("RPC endpoint is empty".to_string()));
        }
        Ok(Self {
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            endpoint: endpoint.to_string(),
        })
    }

    /// Send one JSON-RPC batch and return the replies in request order
    async fn batch_call(&self, requests: Vec<RpcRequest>) -> Result<Vec<Result<Value>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let count = requests.len();
        let method = requests[0].method;
        debug!("RPC batch: {} x {} -> {}", count, method, redact_url(&self.endpoint));

        let response = self
            .http
            .post(&self.endpoint)
            .json(&requests)
            .send()
            .await?;

        let response = ensure_success(response, "RPC batch").await?;

        let replies: Vec<RpcResponse> = response.json().await.map_err(|e| {
            error!("Failed to parse RPC batch response ({} calls): {}", count, e);
            Error::InvalidData(e.to_string())
        })?;

        let mut by_id: HashMap<usize, RpcResponse> =
            replies.into_iter().map(|r| (r.id, r)).collect();

        Ok((0..count)
            .map(|id| match by_id.remove(&id) {
                Some(reply) => reply.into_result(),
                None => Err(Error::InvalidData(format!("RPC reply {} missing", id))),
            })
            .collect())
    }
}

#[async_trait]
impl BalanceProvider for SolanaRpcClient {
    #[instrument(skip(self, wallets), fields(wallets = wallets.len()))]
    async fn batch_token_balances(
        &self,
        wallets: &[String],
        mint: &str,
    ) -> Result<HashMap<String, f64>> {
        let requests = wallets
            .iter()
            .enumerate()
            .map(|(id, wallet)| {
                RpcRequest::new(
                    id,
                    "getTokenAccountsByOwner",
                    json!([wallet, { "mint": mint }, { "encoding": "jsonParsed" }]),
                )
            })
            .collect();

        let replies = self.batch_call(requests).await?;

        let mut balances = HashMap::with_capacity(wallets.len());
        for (wallet, reply) in wallets.iter().zip(replies) {
            match reply.and_then(decode_token_balance) {
                Ok(amount) => {
                    balances.insert(wallet.clone(), amount);
                }
                Err(e) => warn!("Token balance for {} unavailable: {}", wallet, e),
            }
        }
        Ok(balances)
    }

    #[instrument(skip(self, wallets), fields(wallets = wallets.len()))]
    async fn batch_native_balances(&self, wallets: &[String]) -> Result<HashMap<String, f64>> {
        let chunks: Vec<&[String]> = wallets.chunks(MAX_ACCOUNTS_PER_CALL).collect();
        let requests = chunks
            .iter()
            .enumerate()
            .map(|(id, chunk)| {
                RpcRequest::new(
                    id,
                    "getMultipleAccounts",
                    json!([chunk, { "encoding": "base64", "dataSlice": { "offset": 0, "length": 0 } }]),
                )
            })
            .collect();

        let replies = self.batch_call(requests).await?;

        let mut balances = HashMap::with_capacity(wallets.len());
        for (chunk, reply) in chunks.iter().zip(replies) {
            match reply.and_then(decode_multiple_lamports) {
                Ok(lamports) => {
                    for (wallet, amount) in chunk.iter().zip(lamports) {
                        balances.insert(wallet.clone(), Lamports::new(amount).to_sol());
                    }
                }
                Err(e) => warn!("Native balances for {} wallets unavailable: {}", chunk.len(), e),
            }
        }
        Ok(balances)
    }
}

#[async_trait]
impl ActivityProvider for SolanaRpcClient {
    #[instrument(skip(self, wallets), fields(wallets = wallets.len()))]
    async fn batch_nfts(&self, wallets: &[String]) -> Result<HashMap<String, Vec<NftAsset>>> {
        let requests = wallets
            .iter()
            .enumerate()
            .map(|(id, wallet)| {
                RpcRequest::new(
                    id,
                    "getAssetsByOwner",
                    json!({ "ownerAddress": wallet, "page": 1, "limit": ASSET_PAGE_LIMIT }),
                )
            })
            .collect();

        let replies = self.batch_call(requests).await?;

        let mut nfts = HashMap::with_capacity(wallets.len());
        for (wallet, reply) in wallets.iter().zip(replies) {
            match reply.and_then(decode_assets) {
                Ok(assets) => {
                    nfts.insert(wallet.clone(), assets);
                }
                Err(e) => warn!("NFTs for {} unavailable: {}", wallet, e),
            }
        }
        Ok(nfts)
    }

    #[instrument(skip(self, wallets), fields(wallets = wallets.len()))]
    async fn batch_transactions(
        &self,
        wallets: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Vec<TransactionSummary>>> {
        let requests = wallets
            .iter()
            .enumerate()
            .map(|(id, wallet)| {
                RpcRequest::new(id, "getSignaturesForAddress", json!([wallet, { "limit": limit }]))
            })
            .collect();

        let replies = self.batch_call(requests).await?;

        let mut transactions = HashMap::with_capacity(wallets.len());
        for (wallet, reply) in wallets.iter().zip(replies) {
            match reply.and_then(decode_signatures) {
                Ok(txs) => {
                    transactions.insert(wallet.clone(), txs);
                }
                Err(e) => warn!("Transactions for {} unavailable: {}", wallet, e),
            }
        }
        Ok(transactions)
    }
}
