//! Typed call surfaces for the two external contracts.
//!
//! Proxies hold no local state. Reads are view calls. Writes are two-phase:
//! they resolve as soon as the network accepts the call and hands back a
//! hash, and return a separate future for the receipt.
//!
//! Token quantities, fees and reserve values are `uint256` wei on chain and
//! cross this boundary as [`Amount`], which holds the full 256-bit value.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::Amount;
use crate::error::CallError;
use crate::model::{Address, Receipt, TxHash};

/// Awaitable receipt of a submitted call.
pub type ReceiptFuture = Pin<Box<dyn Future<Output = Result<Receipt, CallError>> + Send>>;

/// Handle for a call the network has accepted.
pub struct PendingTx {
    pub hash: TxHash,
    receipt: ReceiptFuture,
}

impl PendingTx {
    pub fn new(
        hash: TxHash,
        receipt: impl Future<Output = Result<Receipt, CallError>> + Send + 'static,
    ) -> Self {
        Self {
            hash,
            receipt: Box::pin(receipt),
        }
    }

    /// Wait for the call to be mined.
    pub async fn wait(self) -> Result<Receipt, CallError> {
        self.receipt.await
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

/// The collateralized token contract.
#[async_trait]
pub trait TokenContract: Send + Sync {
    async fn total_supply(&self) -> Result<Amount, CallError>;

    async fn reserve_balance(&self) -> Result<Amount, CallError>;

    async fn collateralization_ratio(&self) -> Result<Amount, CallError>;

    async fn paused(&self) -> Result<bool, CallError>;

    async fn circulating_supply(&self) -> Result<Amount, CallError>;

    async fn balance_of(&self, account: &Address) -> Result<Amount, CallError>;

    /// Native-asset fee charged on top of the reserve for a mint.
    async fn mint_fee(&self) -> Result<Amount, CallError>;

    async fn burn_fee(&self) -> Result<Amount, CallError>;

    /// Native-asset reserve that must back `amount` newly minted tokens.
    async fn reserve_required_for_mint(&self, amount: Amount) -> Result<Amount, CallError>;

    /// Mint `amount` tokens, attaching `value` of the native asset.
    async fn mint(&self, amount: Amount, value: Amount) -> Result<PendingTx, CallError>;

    async fn burn(&self, amount: Amount) -> Result<PendingTx, CallError>;
}

/// The rate-limited test-token faucet.
#[async_trait]
pub trait FaucetContract: Send + Sync {
    async fn can_request(&self, account: &Address) -> Result<bool, CallError>;

    /// Unix timestamp (seconds) at which `account` may request again.
    async fn next_drip_time(&self, account: &Address) -> Result<u64, CallError>;

    async fn cooldown_period(&self) -> Result<u64, CallError>;

    async fn drip_amount(&self) -> Result<Amount, CallError>;

    async fn request_tokens(&self) -> Result<PendingTx, CallError>;
}
