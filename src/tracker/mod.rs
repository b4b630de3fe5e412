//! Transaction tracker.
//!
//! Submits mint, burn and faucet calls and records each accepted submission
//! as a `pending` history entry. A background task waits for the receipt and
//! moves the entry to `confirmed` or `failed` exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::Amount;
use crate::contracts::{FaucetContract, PendingTx, TokenContract};
use crate::error::{CallError, ContractKind, Error};
use crate::model::{Address, Confirmation, TransactionRecord, TxHash, TxKind, TxStatus};

mod history;
pub use history::{History, Resolution};

/// A user-initiated action to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Mint(Amount),
    Burn(Amount),
    /// The drip amount is set by the faucet and only known after confirmation.
    Faucet,
}

impl Action {
    pub fn kind(&self) -> TxKind {
        match self {
            Action::Mint(_) => TxKind::Mint,
            Action::Burn(_) => TxKind::Burn,
            Action::Faucet => TxKind::Faucet,
        }
    }

    /// Amount recorded at submission time.
    pub fn amount(&self) -> Amount {
        match self {
            Action::Mint(amount) | Action::Burn(amount) => *amount,
            Action::Faucet => Amount::ZERO,
        }
    }
}

/// Signing identity and contract proxies in effect for a submission.
#[derive(Clone)]
pub struct Session {
    pub account: Address,
    pub token: Option<Arc<dyn TokenContract>>,
    pub faucet: Option<Arc<dyn FaucetContract>>,
}

impl Session {
    fn token(&self) -> Result<&Arc<dyn TokenContract>, Error> {
        self.token
            .as_ref()
            .ok_or(Error::ContractUnavailable(ContractKind::Token))
    }

    fn faucet(&self) -> Result<&Arc<dyn FaucetContract>, Error> {
        self.faucet
            .as_ref()
            .ok_or(Error::ContractUnavailable(ContractKind::Faucet))
    }
}

/// An accepted submission. The record is already in history as `pending`.
#[derive(Debug)]
pub struct Submitted {
    pub hash: TxHash,
    confirmation: JoinHandle<TxStatus>,
}

impl Submitted {
    /// Wait for the background confirmation to settle the record.
    pub async fn wait(self) -> Result<TxStatus, JoinError> {
        self.confirmation.await
    }
}

/// Submits transactions and keeps their lifecycle history.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    history: History,
}

/// Public API
impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit `action` and return as soon as the network assigns a hash.
    ///
    /// Fails without creating a record if there is no session, the needed
    /// contract is not configured, the faucet is cooling down, or the call is
    /// rejected before a hash exists.
    pub async fn submit(
        &self,
        session: Option<&Session>,
        action: Action,
    ) -> Result<Submitted, Error> {
        let session = session.ok_or(Error::NotConnected)?;
        let kind = action.kind();

        let (pending, faucet) = match action {
            Action::Mint(amount) => (self.send_mint(session, amount).await, None),
            Action::Burn(amount) => (self.send_burn(session, amount).await, None),
            Action::Faucet => {
                let faucet = session.faucet()?.clone();
                (self.send_faucet(session, &faucet).await, Some(faucet))
            }
        };
        let pending = pending.inspect_err(|e| {
            warn!(kind = %kind, amount = %action.amount(), reason = %e, "submission rejected");
        })?;

        let hash = pending.hash;
        self.history
            .insert(TransactionRecord::pending(hash, kind, action.amount()));
        info!(hash = %hash, kind = %kind, amount = %action.amount(), "transaction sent");

        let history = self.history.clone();
        let confirmation = tokio::spawn(confirm(history, kind, pending, faucet));

        Ok(Submitted { hash, confirmation })
    }

    /// Current history, newest first. Never blocks on the network.
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.history.snapshot()
    }

    pub fn get(&self, hash: &TxHash) -> Option<TransactionRecord> {
        self.history.get(hash)
    }
}

/// Private API
impl Tracker {
    /// Mint attaches the required reserve plus the mint fee as value.
    async fn send_mint(&self, session: &Session, amount: Amount) -> Result<PendingTx, Error> {
        let token = session.token()?;
        let (fee, required) =
            tokio::try_join!(token.mint_fee(), token.reserve_required_for_mint(amount))?;
        let value = required
            .checked_add(fee)
            .ok_or_else(|| Error::Unknown("reserve required for mint overflows".to_string()))?;

        info!(amount = %amount, reserve = %required, fee = %fee, "minting");
        self.send(token.mint(amount, value).await)
    }

    /// The burn fee is informational; the call itself only takes the amount.
    async fn send_burn(&self, session: &Session, amount: Amount) -> Result<PendingTx, Error> {
        let token = session.token()?;
        let fee = token.burn_fee().await?;

        info!(amount = %amount, fee = %fee, "burning");
        self.send(token.burn(amount).await)
    }

    async fn send_faucet(
        &self,
        session: &Session,
        faucet: &Arc<dyn FaucetContract>,
    ) -> Result<PendingTx, Error> {
        if !faucet.can_request(&session.account).await? {
            let next = faucet.next_drip_time(&session.account).await?;
            return Err(Error::CooldownActive {
                next_eligible: next_eligible(next),
            });
        }

        info!(account = %session.account, "requesting faucet tokens");
        self.send(faucet.request_tokens().await)
    }

    /// Classify a write-call failure. A failure carrying the hash of a record
    /// we already hold fails that record; no record is ever created here.
    fn send(&self, result: Result<PendingTx, CallError>) -> Result<PendingTx, Error> {
        result.map_err(|e| {
            if let Some(hash) = &e.tx_hash {
                if self.history.resolve(hash, Resolution::Failed) {
                    warn!(hash = %hash, "transaction failed");
                }
            }
            Error::classify(&e)
        })
    }
}

/// Unix seconds from `nextDripTime` as an instant. Out-of-range values
/// saturate to the latest representable time.
fn next_eligible(next_drip_time: u64) -> DateTime<Utc> {
    i64::try_from(next_drip_time)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Wait for the receipt of `pending` and settle its record.
async fn confirm(
    history: History,
    kind: TxKind,
    pending: PendingTx,
    faucet: Option<Arc<dyn FaucetContract>>,
) -> TxStatus {
    let hash = pending.hash;

    let resolution = match pending.wait().await {
        Ok(receipt) => {
            let amount = match &faucet {
                Some(faucet) => match faucet.drip_amount().await {
                    Ok(amount) => Some(amount),
                    Err(e) => {
                        warn!(hash = %hash, reason = %e, "drip amount unavailable");
                        None
                    }
                },
                None => None,
            };
            Resolution::Confirmed {
                confirmation: Confirmation::from(&receipt),
                amount,
            }
        }
        Err(e) => {
            warn!(hash = %hash, kind = %kind, reason = %Error::classify(&e), "transaction failed");
            Resolution::Failed
        }
    };

    if history.resolve(&hash, resolution) {
        if let Resolution::Confirmed { confirmation, .. } = resolution {
            info!(
                hash = %hash,
                kind = %kind,
                block = confirmation.block_number,
                gas_used = confirmation.gas_used,
                fee = %confirmation.fee,
                "transaction confirmed"
            );
        }
    }

    history
        .get(&hash)
        .map(|record| record.status)
        .unwrap_or(TxStatus::Failed)
}
