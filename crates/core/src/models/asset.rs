//! NFT and transaction summaries used by the ecosystem views

use serde::{Deserialize, Serialize};

/// A (compressed) NFT held by a participant wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftAsset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub compressed: bool,
}

/// A recent on-chain signature touching a wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub memo: Option<String>,
}
