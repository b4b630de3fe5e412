//! Read-only metrics and balances.
//!
//! Each read is all-or-nothing: the view calls run concurrently and if any
//! one fails the whole read falls back to fixed synthetic data. A result
//! never mixes live and synthetic fields.

use tracing::{debug, warn};

use crate::Amount;
use crate::chain::ChainConnector;
use crate::contracts::TokenContract;
use crate::error::{CallError, Error};
use crate::model::{SystemHealth, SystemSnapshot, UserBalance};

/// BTC price used for display. There is no oracle integration; this is a stub.
pub const BTC_PRICE: Amount = Amount::from_tokens(45_000);

/// Snapshot shown when the token contract is absent or unreachable.
pub fn synthetic_snapshot() -> SystemSnapshot {
    SystemSnapshot {
        total_supply: Amount::from_tokens(1_250_000),
        reserve_balance: Amount::from_tokens(5_625_000),
        collateralization_ratio: Amount::from_milli(4_500),
        btc_price: BTC_PRICE,
        system_health: SystemHealth::Healthy,
        is_paused: false,
        circulating_supply: Amount::from_tokens(1_250_000),
    }
}

/// Balances shown when no wallet is connected or a balance read fails.
pub fn synthetic_balance() -> UserBalance {
    UserBalance {
        bbt: Amount::from_milli(1_250_500),
        reserve: Amount::from_milli(2_500),
    }
}

/// The live snapshot if there is one, the synthetic one otherwise.
pub fn snapshot_or_synthetic(live: Option<SystemSnapshot>) -> SystemSnapshot {
    live.unwrap_or_else(synthetic_snapshot)
}

/// Read the five token views concurrently into one snapshot.
pub async fn read_snapshot(token: &dyn TokenContract) -> Result<SystemSnapshot, CallError> {
    let (total_supply, reserve_balance, collateralization_ratio, is_paused, circulating_supply) = tokio::try_join!(
        token.total_supply(),
        token.reserve_balance(),
        token.collateralization_ratio(),
        token.paused(),
        token.circulating_supply(),
    )?;

    Ok(SystemSnapshot {
        total_supply,
        reserve_balance,
        collateralization_ratio,
        btc_price: BTC_PRICE,
        system_health: SystemHealth::classify(collateralization_ratio, total_supply),
        is_paused,
        circulating_supply,
    })
}

/// Current system snapshot; never fails.
pub async fn system_snapshot(token: Option<&dyn TokenContract>) -> SystemSnapshot {
    let Some(token) = token else {
        debug!("token contract not configured, using synthetic metrics");
        return synthetic_snapshot();
    };

    let live = read_snapshot(token)
        .await
        .inspect_err(|e| warn!(reason = %e, "failed to read system metrics, using synthetic metrics"))
        .ok();
    snapshot_or_synthetic(live)
}

/// Balances of the connected account; never fails.
pub async fn user_balances(
    connector: &ChainConnector,
    token: Option<&dyn TokenContract>,
) -> UserBalance {
    let Some(account) = connector.current_account() else {
        debug!("wallet not connected, using synthetic balances");
        return synthetic_balance();
    };

    let bbt = async {
        match token {
            Some(token) => token.balance_of(&account).await.map_err(Error::from),
            None => Ok(Amount::ZERO),
        }
    };
    match tokio::try_join!(connector.native_balance(&account), bbt) {
        Ok((reserve, bbt)) => UserBalance { bbt, reserve },
        Err(e) => {
            warn!(account = %account, reason = %e, "failed to read balances, using synthetic balances");
            synthetic_balance()
        }
    }
}
