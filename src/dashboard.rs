//! Process-wide context object.
//!
//! Build one [`Dashboard`] at startup and pass it by reference to whatever
//! needs chain access. It owns the connector, the bound contract proxies and
//! the transaction history for the session.

use std::sync::{Arc, RwLock};

use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::chain::{ChainConnector, Provider, Subscription};
use crate::config::{Config, ContractAddresses};
use crate::contracts::{FaucetContract, TokenContract};
use crate::error::Error;
use crate::metrics;
use crate::model::{Address, SystemSnapshot, TransactionRecord, TransactionResult, UserBalance};
use crate::tracker::{Action, Session, Submitted, Tracker};

#[derive(Clone, Default)]
struct Proxies {
    token: Option<Arc<dyn TokenContract>>,
    faucet: Option<Arc<dyn FaucetContract>>,
}

pub struct Dashboard {
    config: Config,
    connector: ChainConnector,
    proxies: RwLock<Proxies>,
    tracker: Tracker,
}

/// Public API
impl Dashboard {
    /// `provider` is `None` when no wallet is injected; everything then runs
    /// on synthetic data and writes fail with [`Error::NoProvider`] on connect.
    pub fn new(config: Config, provider: Option<Arc<dyn Provider>>) -> Self {
        Self {
            connector: ChainConnector::new(provider, config.network.clone()),
            config,
            proxies: RwLock::new(Proxies::default()),
            tracker: Tracker::new(),
        }
    }

    /// Connect the wallet, bind the configured contracts and make sure the
    /// wallet is on the target network.
    pub async fn connect(&self) -> Result<Address, Error> {
        let account = self.connector.connect().await?;
        self.bind_proxies()?;
        self.connector.ensure_network().await?;

        info!(
            account = %account,
            token = ?self.config.contracts.token.as_ref().map(ToString::to_string),
            faucet = ?self.config.contracts.faucet.as_ref().map(ToString::to_string),
            "dashboard connected"
        );
        Ok(account)
    }

    /// Ask the wallet to switch back to the target network.
    pub async fn switch_network(&self) -> Result<(), Error> {
        self.connector.ensure_network().await
    }

    /// Forget the signing identity and contract bindings. History is kept.
    pub fn disconnect(&self) {
        self.connector.disconnect();
        *self.proxies_mut() = Proxies::default();
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn account(&self) -> Option<Address> {
        self.connector.current_account()
    }

    pub fn contract_addresses(&self) -> &ContractAddresses {
        self.config.contract_addresses()
    }

    pub fn connector(&self) -> &ChainConnector {
        &self.connector
    }

    pub fn on_account_changed(
        &self,
        handler: impl Fn(&Option<Address>) + Send + Sync + 'static,
    ) -> Subscription {
        self.connector.on_account_changed(handler)
    }

    pub fn on_network_changed(&self, handler: impl Fn(&u64) + Send + Sync + 'static) -> Subscription {
        self.connector.on_network_changed(handler)
    }

    pub async fn system_metrics(&self) -> SystemSnapshot {
        let token = self.proxies().token;
        metrics::system_snapshot(token.as_deref()).await
    }

    pub async fn user_balances(&self) -> UserBalance {
        let token = self.proxies().token;
        metrics::user_balances(&self.connector, token.as_deref()).await
    }

    /// Submit `action` through the tracker. See [`Tracker::submit`].
    pub async fn submit(&self, action: Action) -> Result<Submitted, Error> {
        let session = self.session()?;
        self.tracker.submit(Some(&session), action).await
    }

    pub async fn mint(&self, amount: Amount) -> Result<TransactionResult, Error> {
        self.execute(Action::Mint(amount)).await
    }

    pub async fn burn(&self, amount: Amount) -> Result<TransactionResult, Error> {
        self.execute(Action::Burn(amount)).await
    }

    pub async fn request_faucet_tokens(&self) -> Result<TransactionResult, Error> {
        self.execute(Action::Faucet).await
    }

    /// Transaction history, newest first.
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.tracker.history()
    }

    /// Submit every action of `stream` in order. Rejected actions are logged
    /// and skipped; accepted ones are returned so callers can await them.
    pub async fn run(&self, mut stream: impl Stream<Item = Action> + Unpin) -> Vec<Submitted> {
        let mut submitted = Vec::new();
        while let Some(action) = stream.next().await {
            match self.submit(action).await {
                Ok(s) => submitted.push(s),
                Err(e) => warn!(kind = %action.kind(), amount = %action.amount(), reason = %e, "action skipped"),
            }
        }
        submitted
    }
}

/// Private API
impl Dashboard {
    /// Submit and fold network-side failures into a `TransactionResult`.
    /// Precondition failures are still returned as errors.
    async fn execute(&self, action: Action) -> Result<TransactionResult, Error> {
        match self.submit(action).await {
            Ok(submitted) => Ok(TransactionResult::submitted(submitted.hash)),
            Err(e) if e.is_precondition() => Err(e),
            Err(e) => Ok(TransactionResult::failed(e)),
        }
    }

    fn bind_proxies(&self) -> Result<(), Error> {
        let provider = self.connector.provider()?;
        let contracts = &self.config.contracts;
        let proxies = Proxies {
            token: contracts.token.as_ref().map(|a| provider.token(a)),
            faucet: contracts.faucet.as_ref().map(|a| provider.faucet(a)),
        };
        if proxies.token.is_none() {
            warn!("token address not configured, metrics are synthetic and mint/burn are unavailable");
        }
        if proxies.faucet.is_none() {
            warn!("faucet address not configured, faucet requests are unavailable");
        }
        *self.proxies_mut() = proxies;
        Ok(())
    }

    fn session(&self) -> Result<Session, Error> {
        let account = self.connector.signer()?;
        let Proxies { token, faucet } = self.proxies();
        Ok(Session {
            account,
            token,
            faucet,
        })
    }

    fn proxies(&self) -> Proxies {
        self.proxies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn proxies_mut(&self) -> std::sync::RwLockWriteGuard<'_, Proxies> {
        self.proxies.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::{FAUCET_ADDRESS_VAR, TOKEN_ADDRESS_VAR};
    use crate::error::ContractKind;
    use crate::metrics::{synthetic_balance, synthetic_snapshot};
    use crate::model::{TxKind, TxStatus};
    use crate::sim::{SIM_FAUCET_ADDRESS, SIM_TOKEN_ADDRESS, SimChain};

    fn config(token: bool, faucet: bool) -> Config {
        Config::from_lookup(|var| match var {
            TOKEN_ADDRESS_VAR if token => Some(SIM_TOKEN_ADDRESS.to_string()),
            FAUCET_ADDRESS_VAR if faucet => Some(SIM_FAUCET_ADDRESS.to_string()),
            _ => None,
        })
        .unwrap()
    }

    async fn connected(token: bool, faucet: bool) -> (Arc<SimChain>, Dashboard) {
        let sim = SimChain::new();
        let dashboard = Dashboard::new(config(token, faucet), Some(sim.clone()));
        dashboard.connect().await.unwrap();
        (sim, dashboard)
    }

    #[tokio::test]
    async fn without_provider_everything_is_synthetic() {
        let dashboard = Dashboard::new(config(true, true), None);

        assert_eq!(dashboard.connect().await, Err(Error::NoProvider));
        assert!(!dashboard.is_connected());
        assert_eq!(dashboard.system_metrics().await, synthetic_snapshot());
        assert_eq!(dashboard.user_balances().await, synthetic_balance());
        assert_eq!(
            dashboard.mint(Amount::from_tokens(1)).await,
            Err(Error::NotConnected)
        );
        assert!(dashboard.history().is_empty());
    }

    #[tokio::test]
    async fn connect_binds_proxies() {
        let (sim, dashboard) = connected(true, true).await;
        assert_eq!(dashboard.account(), Some(sim.account()));

        sim.set_supply(Amount::from_tokens(2), Amount::from_tokens(4));
        let snapshot = dashboard.system_metrics().await;
        assert_eq!(snapshot.total_supply, Amount::from_tokens(2));
    }

    #[tokio::test]
    async fn missing_token_address_degrades_to_synthetic() {
        let (_sim, dashboard) = connected(false, true).await;

        assert_eq!(dashboard.system_metrics().await, synthetic_snapshot());
        assert_eq!(
            dashboard.mint(Amount::from_tokens(1)).await,
            Err(Error::ContractUnavailable(ContractKind::Token))
        );

        let result = dashboard.request_faucet_tokens().await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn mint_result_carries_hash() {
        let (_sim, dashboard) = connected(true, true).await;

        let result = dashboard.mint(Amount::from_tokens(4)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.error, None);

        let history = dashboard.history();
        assert_eq!(history.len(), 1);
        assert_eq!(Some(history[0].hash.clone()), result.hash);
        assert_eq!(history[0].kind, TxKind::Mint);
    }

    #[tokio::test]
    async fn network_failures_become_results() {
        let (sim, dashboard) = connected(true, true).await;

        sim.reject_next_signature();
        let result = dashboard.burn(Amount::from_tokens(1)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Transaction rejected by user"));
        assert_eq!(result.hash, None);
        assert!(dashboard.history().is_empty());
    }

    #[tokio::test]
    async fn cooldown_is_raised() {
        let (_sim, dashboard) = connected(true, true).await;

        let first = dashboard.submit(Action::Faucet).await.unwrap();
        assert_eq!(first.wait().await.unwrap(), TxStatus::Confirmed);

        let err = dashboard.request_faucet_tokens().await.unwrap_err();
        assert!(matches!(err, Error::CooldownActive { .. }));
        assert_eq!(dashboard.history().len(), 1);
    }

    #[tokio::test]
    async fn wrong_network_blocks_submissions_until_switched() {
        let (sim, dashboard) = connected(true, true).await;

        sim.set_chain_id(1);
        let err = dashboard.mint(Amount::from_tokens(1)).await.unwrap_err();
        assert!(matches!(err, Error::WrongNetwork { actual: 1, .. }));

        dashboard.switch_network().await.unwrap();
        assert!(dashboard.mint(Amount::from_tokens(1)).await.unwrap().success);
    }

    #[tokio::test]
    async fn disconnect_keeps_history() {
        let (_sim, dashboard) = connected(true, true).await;
        dashboard.mint(Amount::from_tokens(1)).await.unwrap();

        dashboard.disconnect();
        assert!(!dashboard.is_connected());
        assert_eq!(dashboard.history().len(), 1);
        assert_eq!(dashboard.system_metrics().await, synthetic_snapshot());
        assert_eq!(
            dashboard.burn(Amount::from_tokens(1)).await,
            Err(Error::NotConnected)
        );
    }

    #[tokio::test]
    async fn wallet_account_event_does_not_undo_disconnect() {
        let (sim, dashboard) = connected(true, true).await;
        dashboard.disconnect();

        sim.switch_account(Some(sim.account()));
        assert!(!dashboard.is_connected());
        assert_eq!(dashboard.account(), None);
        assert_eq!(
            dashboard.mint(Amount::from_tokens(1)).await,
            Err(Error::NotConnected)
        );

        dashboard.connect().await.unwrap();
        assert!(dashboard.mint(Amount::from_tokens(1)).await.unwrap().success);
    }

    #[tokio::test]
    async fn account_subscription_sees_changes() {
        let (sim, dashboard) = connected(true, true).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = {
            let seen = seen.clone();
            dashboard.on_account_changed(move |a| seen.lock().unwrap().push(*a))
        };

        sim.switch_account(None);
        assert_eq!(dashboard.account(), None);
        sub.unsubscribe();

        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn run_skips_failed_actions_and_continues() {
        let (_sim, dashboard) = connected(true, true).await;
        let actions = vec![
            Action::Mint(Amount::from_tokens(10)),
            Action::Burn(Amount::from_tokens(500)), // exceeds balance
            Action::Faucet,
            Action::Faucet, // cooldown
        ];

        let submitted = dashboard.run(tokio_stream::iter(actions)).await;
        assert_eq!(submitted.len(), 2);
        for s in submitted {
            assert_eq!(s.wait().await.unwrap(), TxStatus::Confirmed);
        }

        let kinds: Vec<_> = dashboard.history().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![TxKind::Faucet, TxKind::Mint]);
    }
}
