//! Core domain types shared by the tracker, readers and the chain boundary.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::Amount;

pub use alloy_primitives::Address;

/// 32-byte transaction hash.
pub type TxHash = alloy_primitives::B256;

/// The user-initiated on-chain actions the dashboard can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Mint,
    Burn,
    Faucet,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxKind::Mint => "mint",
            TxKind::Burn => "burn",
            TxKind::Faucet => "faucet",
        })
    }
}

/// Lifecycle state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxStatus {
    /// Accepted by the network, receipt not yet seen.
    #[default]
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        })
    }
}

/// Post-confirmation facts about a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block_number: u64,
    pub gas_used: u64,
    /// Effective gas price in wei.
    pub gas_price: u128,
}

impl Receipt {
    pub fn fee(&self) -> Amount {
        Amount::fee(self.gas_used, self.gas_price)
    }
}

/// Facts filled in once a record is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub block_number: u64,
    pub gas_used: u64,
    pub fee: Amount,
}

impl From<&Receipt> for Confirmation {
    fn from(receipt: &Receipt) -> Self {
        Self {
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            fee: receipt.fee(),
        }
    }
}

/// One user-initiated on-chain action, created once the network hands back a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub kind: TxKind,
    /// Zero for faucet requests until the drip amount is known.
    pub amount: Amount,
    pub submitted_at: DateTime<Utc>,
    pub status: TxStatus,
    /// Present only when `status` is `Confirmed`.
    pub confirmation: Option<Confirmation>,
}

impl TransactionRecord {
    /// Create a new record in the `Pending` state.
    pub fn pending(hash: TxHash, kind: TxKind, amount: Amount) -> Self {
        Self {
            hash,
            kind,
            amount,
            submitted_at: Utc::now(),
            status: TxStatus::Pending,
            confirmation: None,
        }
    }

    pub fn block_number(&self) -> Option<u64> {
        self.confirmation.map(|c| c.block_number)
    }

    pub fn gas_used(&self) -> Option<u64> {
        self.confirmation.map(|c| c.gas_used)
    }

    pub fn fee(&self) -> Option<Amount> {
        self.confirmation.map(|c| c.fee)
    }
}

/// Health classification derived from the collateralization ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemHealth {
    Healthy,
    Warning,
    Critical,
}

impl SystemHealth {
    /// A system with no supply is `Critical` whatever the ratio reads.
    /// Otherwise a ratio of at least 1.5 is `Healthy` and at least 1.2 is `Warning`.
    pub fn classify(collateralization_ratio: Amount, total_supply: Amount) -> Self {
        if total_supply.is_zero() {
            SystemHealth::Critical
        } else if collateralization_ratio >= Amount::from_milli(1_500) {
            SystemHealth::Healthy
        } else if collateralization_ratio >= Amount::from_milli(1_200) {
            SystemHealth::Warning
        } else {
            SystemHealth::Critical
        }
    }
}

impl fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SystemHealth::Healthy => "healthy",
            SystemHealth::Warning => "warning",
            SystemHealth::Critical => "critical",
        })
    }
}

/// Read-only view of system-wide token state, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub total_supply: Amount,
    pub reserve_balance: Amount,
    pub collateralization_ratio: Amount,
    pub btc_price: Amount,
    pub system_health: SystemHealth,
    pub is_paused: bool,
    pub circulating_supply: Amount,
}

/// The connected account's token and native-asset balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserBalance {
    pub bbt: Amount,
    pub reserve: Amount,
}

/// Outcome of a mint, burn or faucet request as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionResult {
    pub success: bool,
    pub error: Option<String>,
    pub hash: Option<TxHash>,
}

impl TransactionResult {
    pub fn submitted(hash: TxHash) -> Self {
        Self {
            success: true,
            error: None,
            hash: Some(hash),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            hash: None,
        }
    }
}
