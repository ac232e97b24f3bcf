//! JSON-RPC wire types and result decoding

use pecoin_core::{Error, NftAsset, Result, TransactionSummary, UiAmount};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One call inside a JSON-RPC batch
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: usize,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: usize, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One reply inside a JSON-RPC batch; servers may reorder replies
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub id: usize,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(Error::ApiError(format!("RPC error {}: {}", err.code, err.message)));
        }
        self.result
            .ok_or_else(|| Error::InvalidData(format!("RPC reply {} has no result", self.id)))
    }
}

// ─── getTokenAccountsByOwner ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenAccountsResult {
    value: Vec<KeyedTokenAccount>,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    account: TokenAccount,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: TokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    amount: String,
    decimals: u8,
}

/// Sum the balance of every token account a wallet holds for the mint
pub fn decode_token_balance(result: Value) -> Result<f64> {
    let parsed: TokenAccountsResult = serde_json::from_value(result)?;
    let mut total = 0.0;
    for keyed in parsed.value {
        let amount = &keyed.account.data.parsed.info.token_amount;
        let raw: u64 = amount
            .amount
            .parse()
            .map_err(|_| Error::InvalidData(format!("bad token amount: {}", amount.amount)))?;
        total += UiAmount::from_raw(raw, amount.decimals).as_f64();
    }
    Ok(total)
}

// ─── getMultipleAccounts ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MultipleAccountsResult {
    value: Vec<Option<LamportsOnly>>,
}

#[derive(Debug, Deserialize)]
struct LamportsOnly {
    lamports: u64,
}

/// Lamports per requested account, in request order. Missing accounts hold 0.
pub fn decode_multiple_lamports(result: Value) -> Result<Vec<u64>> {
    let parsed: MultipleAccountsResult = serde_json::from_value(result)?;
    Ok(parsed
        .value
        .into_iter()
        .map(|a| a.map(|a| a.lamports).unwrap_or(0))
        .collect())
}

// ─── getAssetsByOwner (DAS) ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AssetPage {
    #[serde(default)]
    items: Vec<DasAsset>,
}

#[derive(Debug, Deserialize)]
struct DasAsset {
    id: String,
    #[serde(default)]
    content: Option<DasContent>,
    #[serde(default)]
    grouping: Vec<DasGroup>,
    #[serde(default)]
    compression: Option<DasCompression>,
}

#[derive(Debug, Deserialize)]
struct DasContent {
    #[serde(default)]
    metadata: Option<DasMetadata>,
    #[serde(default)]
    links: Option<DasLinks>,
}

#[derive(Debug, Deserialize)]
struct DasMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DasLinks {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DasGroup {
    group_key: String,
    group_value: String,
}

#[derive(Debug, Deserialize)]
struct DasCompression {
    #[serde(default)]
    compressed: bool,
}

pub fn decode_assets(result: Value) -> Result<Vec<NftAsset>> {
    let page: AssetPage = serde_json::from_value(result)?;
    Ok(page
        .items
        .into_iter()
        .map(|a| {
            let name = a
                .content
                .as_ref()
                .and_then(|c| c.metadata.as_ref())
                .and_then(|m| m.name.clone())
                .unwrap_or_else(|| a.id.clone());
            let image = a
                .content
                .as_ref()
                .and_then(|c| c.links.as_ref())
                .and_then(|l| l.image.clone());
            let collection = a
                .grouping
                .iter()
                .find(|g| g.group_key == "collection")
                .map(|g| g.group_value.clone());
            NftAsset {
                id: a.id,
                name,
                image,
                collection,
                compressed: a.compression.map(|c| c.compressed).unwrap_or(false),
            }
        })
        .collect())
}

// ─── getSignaturesForAddress ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    memo: Option<String>,
}

pub fn decode_signatures(result: Value) -> Result<Vec<TransactionSummary>> {
    let infos: Vec<SignatureInfo> = serde_json::from_value(result)?;
    Ok(infos
        .into_iter()
        .map(|s| TransactionSummary {
            signature: s.signature,
            slot: s.slot,
            block_time: s.block_time,
            success: s.err.map(|e| e.is_null()).unwrap_or(true),
            memo: s.memo,
        })
        .collect())
}
