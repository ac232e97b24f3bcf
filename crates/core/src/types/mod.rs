//! Shared type definitions and newtypes

use serde::{Deserialize, Serialize};

/// Number of lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Native balance in lamports (for clarity in function signatures)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lamports(pub u64);

impl Lamports {
    pub fn new(amount: u64) -> Self {
        Lamports(amount)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Convert to a SOL amount for display
    pub fn to_sol(&self) -> f64 {
        self.0 as f64 / LAMPORTS_PER_SOL as f64
    }
}

/// Token amount already scaled by the mint's decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiAmount(pub f64);

impl UiAmount {
    /// Scale a raw integer amount by `decimals`
    pub fn from_raw(raw: u64, decimals: u8) -> Self {
        UiAmount(raw as f64 / 10f64.powi(decimals as i32))
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}
