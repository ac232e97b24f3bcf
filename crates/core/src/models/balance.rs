//! Balance lookup models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Cache identity for a token balance: the same wallet holding two mints
/// is two separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletKey {
    pub wallet: String,
    pub mint: String,
}

impl WalletKey {
    pub fn new(wallet: impl Into<String>, mint: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            mint: mint.into(),
        }
    }
}

impl fmt::Display for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.wallet, self.mint)
    }
}

/// Result of a batch balance read.
///
/// `balances` always holds one entry per distinct requested wallet. Wallets
/// whose balance could not be determined are reported as `0.0` and also
/// listed in `failed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceLookup {
    pub balances: HashMap<String, f64>,
    pub cache_hits: usize,
    pub fetched: usize,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BalanceLookup {
    pub fn total(&self) -> f64 {
        self.balances.values().sum()
    }
}

/// Body of `POST /api/balances`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBalanceRequest {
    pub wallets: Vec<String>,
    pub mint: String,
}

/// Body of `POST /api/balances/native`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeBalanceRequest {
    pub wallets: Vec<String>,
}

/// Timing block returned alongside balances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTiming {
    pub total_ms: u64,
    pub cache_hits: usize,
    pub fetched: usize,
}

/// Response of the batch balance endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBalanceResponse {
    pub balances: HashMap<String, f64>,
    pub timing: BalanceTiming,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchBalanceResponse {
    pub fn from_lookup(lookup: BalanceLookup, total_ms: u64) -> Self {
        Self {
            timing: BalanceTiming {
                total_ms,
                cache_hits: lookup.cache_hits,
                fetched: lookup.fetched,
            },
            balances: lookup.balances,
            failed: lookup.failed,
            error: lookup.error,
        }
    }
}
