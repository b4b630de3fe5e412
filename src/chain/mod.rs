//! Chain connector.
//!
//! Wraps a wallet-injected provider: account discovery, the network identity
//! check and switch, and change notifications for dependents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::Amount;
use crate::config::NetworkConfig;
use crate::contracts::{FaucetContract, TokenContract};
use crate::error::{CallError, Error};
use crate::model::Address;

mod subscription;
use subscription::Listeners;
pub use subscription::Subscription;

/// Notifications a provider pushes after connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// New account list; empty when the wallet disconnected.
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

pub type EventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Capabilities a wallet-injected provider exposes.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Prompt the user for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, CallError>;

    async fn chain_id(&self) -> Result<u64, CallError>;

    async fn switch_or_add_network(&self, network: &NetworkConfig) -> Result<(), CallError>;

    /// Native-asset balance of `account`.
    async fn balance(&self, account: &Address) -> Result<Amount, CallError>;

    fn on_event(&self, handler: EventHandler);

    /// Bind the token contract at `address` to the provider's signer.
    fn token(&self, address: &Address) -> Arc<dyn TokenContract>;

    /// Bind the faucet contract at `address` to the provider's signer.
    fn faucet(&self, address: &Address) -> Arc<dyn FaucetContract>;
}

#[derive(Debug, Default)]
struct ConnectionState {
    account: Option<Address>,
    chain_id: Option<u64>,
    /// False until `ensure_network` succeeds, and again after a switch away.
    on_target_network: bool,
}

struct Shared {
    target_chain_id: u64,
    state: RwLock<ConnectionState>,
    account_listeners: Arc<Listeners<Option<Address>>>,
    network_listeners: Arc<Listeners<u64>>,
}

impl Shared {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, ConnectionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ConnectionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let account = accounts.into_iter().next();
                {
                    // Only `connect` establishes an identity.
                    let mut state = self.write();
                    if state.account.is_none() {
                        debug!(account = ?account, "ignoring account change while disconnected");
                        return;
                    }
                    state.account = account;
                }
                match &account {
                    Some(account) => info!(account = %account, "account changed"),
                    None => info!("account disconnected"),
                }
                self.account_listeners.notify(&account);
            }
            ProviderEvent::ChainChanged(chain_id) => {
                let on_target = chain_id == self.target_chain_id;
                if on_target {
                    info!(chain_id = %format!("{chain_id:#x}"), "chain changed");
                } else {
                    warn!(
                        chain_id = %format!("{chain_id:#x}"),
                        expected = %format!("{:#x}", self.target_chain_id),
                        "chain changed to unsupported network"
                    );
                }
                {
                    let mut state = self.write();
                    state.chain_id = Some(chain_id);
                    state.on_target_network = on_target;
                }
                self.network_listeners.notify(&chain_id);
            }
        }
    }
}

/// Connection to the user's wallet for one process.
pub struct ChainConnector {
    provider: Option<Arc<dyn Provider>>,
    network: NetworkConfig,
    shared: Arc<Shared>,
    listening: AtomicBool,
}

/// Public API
impl ChainConnector {
    /// `provider` is `None` when no wallet is injected.
    pub fn new(provider: Option<Arc<dyn Provider>>, network: NetworkConfig) -> Self {
        Self {
            provider,
            shared: Arc::new(Shared {
                target_chain_id: network.chain_id,
                state: RwLock::new(ConnectionState::default()),
                account_listeners: Arc::new(Listeners::new()),
                network_listeners: Arc::new(Listeners::new()),
            }),
            network,
            listening: AtomicBool::new(false),
        }
    }

    /// Request account access and adopt the first account as signing identity.
    pub async fn connect(&self) -> Result<Address, Error> {
        let provider = self.provider()?;

        let accounts = provider.request_accounts().await.map_err(|e| {
            let err = Error::classify(&e);
            warn!(reason = %e, "account request failed");
            err
        })?;
        let account = accounts.into_iter().next().ok_or(Error::NotConnected)?;

        self.shared.write().account = Some(account);
        self.listen(provider);

        info!(account = %account, "wallet connected");
        Ok(account)
    }

    /// Make sure the wallet is on the target network, asking it to switch if not.
    pub async fn ensure_network(&self) -> Result<(), Error> {
        let provider = self.provider()?;
        let wrong_network = |actual| Error::WrongNetwork {
            expected: self.network.chain_name.clone(),
            actual,
        };

        let mut chain_id = provider.chain_id().await?;
        if chain_id != self.network.chain_id {
            info!(
                from = %format!("{chain_id:#x}"),
                to = %self.network.chain_id_hex(),
                "switching network"
            );
            if let Err(e) = provider.switch_or_add_network(&self.network).await {
                warn!(reason = %e, "network switch failed");
                self.record_chain(chain_id, false);
                return Err(wrong_network(chain_id));
            }
            chain_id = provider.chain_id().await?;
        }

        let on_target = chain_id == self.network.chain_id;
        self.record_chain(chain_id, on_target);
        if on_target {
            Ok(())
        } else {
            Err(wrong_network(chain_id))
        }
    }

    /// Drop the signing identity. Provider listeners stay registered.
    pub fn disconnect(&self) {
        let mut state = self.shared.write();
        state.account = None;
        info!("wallet disconnected");
    }

    pub fn current_account(&self) -> Option<Address> {
        self.shared.read().account
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read().account.is_some()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.shared.read().chain_id
    }

    /// The signing identity, provided the connector is usable.
    pub fn signer(&self) -> Result<Address, Error> {
        let state = self.shared.read();
        let account = state.account.ok_or(Error::NotConnected)?;
        if !state.on_target_network {
            return Err(Error::WrongNetwork {
                expected: self.network.chain_name.clone(),
                actual: state.chain_id.unwrap_or_default(),
            });
        }
        Ok(account)
    }

    pub async fn native_balance(&self, account: &Address) -> Result<Amount, Error> {
        Ok(self.provider()?.balance(account).await?)
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn provider(&self) -> Result<&Arc<dyn Provider>, Error> {
        self.provider.as_ref().ok_or(Error::NoProvider)
    }

    /// Call `handler` with the new account (or `None`) whenever it changes.
    pub fn on_account_changed(
        &self,
        handler: impl Fn(&Option<Address>) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.account_listeners.subscribe(handler)
    }

    /// Call `handler` with the new chain id whenever the wallet switches networks.
    pub fn on_network_changed(&self, handler: impl Fn(&u64) + Send + Sync + 'static) -> Subscription {
        self.shared.network_listeners.subscribe(handler)
    }
}

/// Private API
impl ChainConnector {
    /// Register for provider events once per connector.
    fn listen(&self, provider: &Arc<dyn Provider>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        provider.on_event(Arc::new(move |event| shared.handle(event)));
    }

    fn record_chain(&self, chain_id: u64, on_target: bool) {
        let mut state = self.shared.write();
        state.chain_id = Some(chain_id);
        state.on_target_network = on_target;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::FUJI_CHAIN_ID;
    use crate::sim::SimChain;

    fn connector(sim: &Arc<SimChain>) -> ChainConnector {
        ChainConnector::new(Some(sim.clone()), NetworkConfig::fuji())
    }

    #[tokio::test]
    async fn connect_without_provider_fails() {
        let connector = ChainConnector::new(None, NetworkConfig::fuji());
        assert_eq!(connector.connect().await, Err(Error::NoProvider));
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn connect_adopts_first_account() {
        let sim = SimChain::new();
        let connector = connector(&sim);

        let account = connector.connect().await.unwrap();
        assert_eq!(account, sim.account());
        assert_eq!(connector.current_account(), Some(sim.account()));
    }

    #[tokio::test]
    async fn connect_rejected_by_user() {
        let sim = SimChain::new();
        sim.reject_next_signature();
        let connector = connector(&sim);

        assert_eq!(connector.connect().await, Err(Error::UserRejected));
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn signer_requires_target_network() {
        let sim = SimChain::new();
        let connector = connector(&sim);
        connector.connect().await.unwrap();

        assert!(matches!(connector.signer(), Err(Error::WrongNetwork { .. })));
        connector.ensure_network().await.unwrap();
        assert_eq!(connector.signer(), Ok(sim.account()));
    }

    #[tokio::test]
    async fn ensure_network_switches_when_on_other_chain() {
        let sim = SimChain::new();
        sim.set_chain_id(1);
        let connector = connector(&sim);
        connector.connect().await.unwrap();

        connector.ensure_network().await.unwrap();
        assert_eq!(connector.chain_id(), Some(FUJI_CHAIN_ID));
        assert_eq!(sim.chain_id_now(), FUJI_CHAIN_ID);
    }

    #[tokio::test]
    async fn declined_switch_is_wrong_network() {
        let sim = SimChain::new();
        sim.set_chain_id(1);
        sim.decline_network_switch(true);
        let connector = connector(&sim);
        connector.connect().await.unwrap();

        let err = connector.ensure_network().await.unwrap_err();
        assert!(matches!(err, Error::WrongNetwork { actual: 1, .. }));
        assert!(connector.signer().is_err());
    }

    #[tokio::test]
    async fn account_change_updates_identity_and_notifies() {
        let sim = SimChain::new();
        let connector = connector(&sim);
        connector.connect().await.unwrap();
        connector.ensure_network().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = {
            let seen = seen.clone();
            connector.on_account_changed(move |account| seen.lock().unwrap().push(*account))
        };

        let other = Address::with_last_byte(0xb2);
        sim.switch_account(Some(other));
        assert_eq!(connector.current_account(), Some(other));

        sim.switch_account(None);
        assert!(!connector.is_connected());
        assert_eq!(connector.signer(), Err(Error::NotConnected));

        sub.unsubscribe();
        sim.switch_account(Some(other));

        assert_eq!(*seen.lock().unwrap(), vec![Some(other), None]);
    }

    #[tokio::test]
    async fn account_event_after_disconnect_does_not_reconnect() {
        let sim = SimChain::new();
        let connector = connector(&sim);
        connector.connect().await.unwrap();
        connector.ensure_network().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            connector.on_account_changed(move |account| seen.lock().unwrap().push(*account))
        };

        connector.disconnect();
        sim.switch_account(Some(Address::with_last_byte(0xb3)));

        assert!(!connector.is_connected());
        assert_eq!(connector.current_account(), None);
        assert_eq!(connector.signer(), Err(Error::NotConnected));
        assert!(seen.lock().unwrap().is_empty());

        let account = connector.connect().await.unwrap();
        assert_eq!(connector.current_account(), Some(account));
    }

    #[tokio::test]
    async fn chain_change_makes_connector_unusable_until_switched_back() {
        let sim = SimChain::new();
        let connector = connector(&sim);
        connector.connect().await.unwrap();
        connector.ensure_network().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            connector.on_network_changed(move |id| seen.lock().unwrap().push(*id))
        };

        sim.set_chain_id(1);
        assert!(matches!(connector.signer(), Err(Error::WrongNetwork { actual: 1, .. })));

        connector.ensure_network().await.unwrap();
        assert!(connector.signer().is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![1, FUJI_CHAIN_ID]);
    }

    #[tokio::test]
    async fn connecting_twice_registers_one_listener() {
        let sim = SimChain::new();
        let connector = connector(&sim);
        connector.connect().await.unwrap();
        connector.connect().await.unwrap();
        assert_eq!(sim.listener_count(), 1);
    }
}
