//! In-memory chain implementing the provider and both contracts.
//!
//! Backs the action runner binary and the test suite. Bookkeeping is kept
//! to what the dashboard observes: supply, reserve, balances, fees, the
//! faucet cooldown and receipts. Failures can be injected per call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use alloy_primitives::{U256, address};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::Amount;
use crate::chain::{EventHandler, Provider, ProviderEvent};
use crate::config::{FUJI_CHAIN_ID, NetworkConfig};
use crate::contracts::{FaucetContract, PendingTx, TokenContract};
use crate::error::{CallError, RPC_INTERNAL_CODE};
use crate::model::{Address, Receipt, TxHash};

pub const SIM_ACCOUNT: Address = address!("0x00000000000000000000000000000000000000a1");
pub const SIM_TOKEN_ADDRESS: Address = address!("0x0000000000000000000000000000000000000b17");
pub const SIM_FAUCET_ADDRESS: Address = address!("0x0000000000000000000000000000000000000fa0");

const MINT_GAS: u64 = 120_000;
const BURN_GAS: u64 = 90_000;
const FAUCET_GAS: u64 = 65_000;

/// Starting parameters of a simulated chain.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub chain_id: u64,
    pub account: Address,
    pub native_balance: Amount,
    pub mint_fee: Amount,
    pub burn_fee: Amount,
    /// Reserve required per minted token, as numerator / denominator.
    pub reserve_per_token: (u64, u64),
    pub drip_amount: Amount,
    pub cooldown_secs: u64,
    /// Effective gas price in wei.
    pub gas_price: u128,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chain_id: FUJI_CHAIN_ID,
            account: SIM_ACCOUNT,
            native_balance: Amount::from_tokens(1_000),
            mint_fee: Amount::from_milli(10),
            burn_fee: Amount::from_milli(5),
            reserve_per_token: (3, 2),
            drip_amount: Amount::from_tokens(100),
            cooldown_secs: 24 * 60 * 60,
            gas_price: 25_000_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    Mint { amount: Amount, value: Amount },
    Burn { amount: Amount },
    Drip,
}

struct Waiting {
    hash: TxHash,
    account: Address,
    gas_used: u64,
    effect: Effect,
    reverts: bool,
    sender: oneshot::Sender<Result<Receipt, CallError>>,
}

#[derive(Default)]
struct State {
    chain_id: u64,
    accounts: Vec<Address>,
    native: HashMap<Address, Amount>,
    tokens: HashMap<Address, Amount>,
    total_supply: Amount,
    reserve: Amount,
    paused: bool,
    last_drip: HashMap<Address, i64>,
    block_number: u64,
    nonce: u64,
    receipts: HashMap<TxHash, Receipt>,
    hold_receipts: bool,
    waiting: BTreeMap<u64, Waiting>,
    failing_views: HashSet<String>,
    reject_next: bool,
    revert_next: bool,
    decline_switch: bool,
    last_mint_value: Option<Amount>,
}

/// Simulated chain. Always handled through an `Arc`.
pub struct SimChain {
    config: SimConfig,
    this: Weak<SimChain>,
    state: Mutex<State>,
    handlers: Mutex<Vec<EventHandler>>,
}

/// Public API
impl SimChain {
    pub fn new() -> Arc<Self> {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Arc<Self> {
        let mut state = State {
            chain_id: config.chain_id,
            accounts: vec![config.account],
            block_number: 1,
            ..State::default()
        };
        state.native.insert(config.account, config.native_balance);

        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            state: Mutex::new(state),
            handlers: Mutex::new(Vec::new()),
        })
    }

    pub fn account(&self) -> Address {
        self.config.account
    }

    /// Token contract bound at the default simulated address.
    pub fn token_contract(&self) -> Arc<dyn TokenContract> {
        self.token(&SIM_TOKEN_ADDRESS)
    }

    /// Faucet contract bound at the default simulated address.
    pub fn faucet_contract(&self) -> Arc<dyn FaucetContract> {
        self.faucet(&SIM_FAUCET_ADDRESS)
    }

    /// Keep receipts back until [`release`](Self::release) or
    /// [`release_receipts`](Self::release_receipts).
    pub fn hold_receipts(&self, hold: bool) {
        self.lock().hold_receipts = hold;
    }

    /// Mine every held transaction in submission order.
    pub fn release_receipts(&self) {
        let mut state = self.lock();
        let waiting = std::mem::take(&mut state.waiting);
        for (_, tx) in waiting {
            self.mine(&mut state, tx);
        }
    }

    /// Mine one held transaction.
    pub fn release(&self, hash: &TxHash) {
        let mut state = self.lock();
        let nonce = state
            .waiting
            .iter()
            .find(|(_, tx)| tx.hash == *hash)
            .map(|(nonce, _)| *nonce);
        let tx = nonce.and_then(|n| state.waiting.remove(&n));
        if let Some(tx) = tx {
            self.mine(&mut state, tx);
        }
    }

    /// The next wallet prompt (account request or write call) is declined.
    pub fn reject_next_signature(&self) {
        self.lock().reject_next = true;
    }

    /// The next submitted transaction is accepted but reverts when mined.
    pub fn revert_next_receipt(&self) {
        self.lock().revert_next = true;
    }

    /// Make the named view call fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_view(&self, name: &str) {
        self.lock().failing_views.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_views.clear();
    }

    pub fn decline_network_switch(&self, decline: bool) {
        self.lock().decline_switch = decline;
    }

    /// Move the wallet to another chain and notify listeners.
    pub fn set_chain_id(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
        self.emit(ProviderEvent::ChainChanged(chain_id));
    }

    pub fn chain_id_now(&self) -> u64 {
        self.lock().chain_id
    }

    /// Switch the wallet's active account (`None` disconnects) and notify listeners.
    pub fn switch_account(&self, account: Option<Address>) {
        let accounts: Vec<Address> = account.into_iter().collect();
        self.lock().accounts = accounts.clone();
        self.emit(ProviderEvent::AccountsChanged(accounts));
    }

    pub fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    /// Overwrite supply and reserve, e.g. to land on a given collateralization ratio.
    pub fn set_supply(&self, total_supply: Amount, reserve: Amount) {
        let mut state = self.lock();
        state.total_supply = total_supply;
        state.reserve = reserve;
    }

    pub fn listener_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or_default()
    }

    pub fn last_mint_value(&self) -> Option<Amount> {
        self.lock().last_mint_value
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.lock().receipts.get(hash).copied()
    }

    pub fn token_balance(&self, account: &Address) -> Amount {
        self.lock().tokens.get(account).copied().unwrap_or_default()
    }
}

/// Private API
impl SimChain {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ProviderEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Run a view call body unless the view has been made to fail.
    fn view<T>(&self, name: &str, read: impl FnOnce(&State) -> T) -> Result<T, CallError> {
        let state = self.lock();
        if state.failing_views.contains(name) {
            return Err(CallError::with_code(
                RPC_INTERNAL_CODE,
                format!("call to {name} failed"),
            ));
        }
        Ok(read(&*state))
    }

    fn reserve_required(&self, amount: Amount) -> Result<Amount, CallError> {
        let (num, den) = self.config.reserve_per_token;
        amount
            .mul_ratio(num, den)
            .ok_or_else(|| CallError::new("execution reverted: reserve overflow"))
    }

    fn next_drip_time(&self, state: &State, account: &Address) -> i64 {
        state
            .last_drip
            .get(account)
            .map(|last| last + self.config.cooldown_secs as i64)
            .unwrap_or_default()
    }

    /// Accept a write call: validate it, hand back a hash, and either mine it
    /// right away or hold it.
    fn submit(
        &self,
        gas_used: u64,
        effect: Effect,
        validate: impl FnOnce(&State, &Address) -> Result<(), CallError>,
    ) -> Result<PendingTx, CallError> {
        let mut state = self.lock();
        if std::mem::take(&mut state.reject_next) {
            return Err(CallError::user_rejected());
        }
        let account = state
            .accounts
            .first()
            .copied()
            .ok_or_else(|| CallError::with_code(4100, "no authorized account"))?;
        validate(&*state, &account)?;

        state.nonce += 1;
        let hash = TxHash::from(U256::from(state.nonce));
        let (sender, receiver) = oneshot::channel();
        let tx = Waiting {
            hash,
            account,
            gas_used,
            effect,
            reverts: std::mem::take(&mut state.revert_next),
            sender,
        };

        if state.hold_receipts {
            let nonce = state.nonce;
            state.waiting.insert(nonce, tx);
        } else {
            self.mine(&mut state, tx);
        }

        debug!(hash = %hash, "sim accepted transaction");
        Ok(PendingTx::new(hash, async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(CallError::new("receipt channel closed")))
        }))
    }

    fn mine(&self, state: &mut State, tx: Waiting) {
        state.block_number += 1;
        let receipt = Receipt {
            block_number: state.block_number,
            gas_used: tx.gas_used,
            gas_price: self.config.gas_price,
        };
        state.receipts.insert(tx.hash, receipt);

        let gas_cost = receipt.fee();
        let native = state.native.entry(tx.account).or_default();
        *native = native.checked_sub(gas_cost).unwrap_or_default();

        if tx.reverts {
            let _ = tx
                .sender
                .send(Err(CallError::new("transaction execution reverted").for_tx(tx.hash)));
            return;
        }

        match tx.effect {
            Effect::Mint { amount, value } => {
                let native = state.native.entry(tx.account).or_default();
                *native = native.checked_sub(value).unwrap_or_default();
                *state.tokens.entry(tx.account).or_default() += amount;
                state.total_supply += amount;
                state.reserve += value;
            }
            Effect::Burn { amount } => {
                let released = self.reserve_required(amount).unwrap_or_default();
                let released = released.min(state.reserve);
                let balance = state.tokens.entry(tx.account).or_default();
                *balance = balance.checked_sub(amount).unwrap_or_default();
                state.total_supply = state.total_supply.checked_sub(amount).unwrap_or_default();
                state.reserve -= released;
                *state.native.entry(tx.account).or_default() += released;
            }
            Effect::Drip => {
                *state.tokens.entry(tx.account).or_default() += self.config.drip_amount;
                state.total_supply += self.config.drip_amount;
                state.last_drip.insert(tx.account, Utc::now().timestamp());
            }
        }

        let _ = tx.sender.send(Ok(receipt));
    }
}

#[async_trait]
impl Provider for SimChain {
    async fn request_accounts(&self) -> Result<Vec<Address>, CallError> {
        let mut state = self.lock();
        if std::mem::take(&mut state.reject_next) {
            return Err(CallError::user_rejected());
        }
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, CallError> {
        Ok(self.lock().chain_id)
    }

    async fn switch_or_add_network(&self, network: &NetworkConfig) -> Result<(), CallError> {
        if self.lock().decline_switch {
            return Err(CallError::user_rejected());
        }
        self.set_chain_id(network.chain_id);
        Ok(())
    }

    async fn balance(&self, account: &Address) -> Result<Amount, CallError> {
        self.view("getBalance", |s| s.native.get(account).copied().unwrap_or_default())
    }

    fn on_event(&self, handler: EventHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    fn token(&self, _address: &Address) -> Arc<dyn TokenContract> {
        Arc::new(SimToken {
            chain: self.this.clone(),
        })
    }

    fn faucet(&self, _address: &Address) -> Arc<dyn FaucetContract> {
        Arc::new(SimFaucet {
            chain: self.this.clone(),
        })
    }
}

fn upgrade(chain: &Weak<SimChain>) -> Result<Arc<SimChain>, CallError> {
    chain
        .upgrade()
        .ok_or_else(|| CallError::new("simulated chain has shut down"))
}

struct SimToken {
    chain: Weak<SimChain>,
}

#[async_trait]
impl TokenContract for SimToken {
    async fn total_supply(&self) -> Result<Amount, CallError> {
        upgrade(&self.chain)?.view("totalSupply", |s| s.total_supply)
    }

    async fn reserve_balance(&self) -> Result<Amount, CallError> {
        upgrade(&self.chain)?.view("getReserveBalance", |s| s.reserve)
    }

    async fn collateralization_ratio(&self) -> Result<Amount, CallError> {
        upgrade(&self.chain)?.view("getCollateralizationRatio", |s| {
            if s.total_supply.is_zero() {
                return Amount::ZERO;
            }
            s.reserve.ratio_to(s.total_supply).unwrap_or_default()
        })
    }

    async fn paused(&self) -> Result<bool, CallError> {
        upgrade(&self.chain)?.view("paused", |s| s.paused)
    }

    async fn circulating_supply(&self) -> Result<Amount, CallError> {
        upgrade(&self.chain)?.view("circulatingSupply", |s| s.total_supply)
    }

    async fn balance_of(&self, account: &Address) -> Result<Amount, CallError> {
        upgrade(&self.chain)?.view("balanceOf", |s| {
            s.tokens.get(account).copied().unwrap_or_default()
        })
    }

    async fn mint_fee(&self) -> Result<Amount, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("mintFee", |_| chain.config.mint_fee)
    }

    async fn burn_fee(&self) -> Result<Amount, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("burnFee", |_| chain.config.burn_fee)
    }

    async fn reserve_required_for_mint(&self, amount: Amount) -> Result<Amount, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("getReserveRequiredForMint", |_| ())?;
        chain.reserve_required(amount)
    }

    async fn mint(&self, amount: Amount, value: Amount) -> Result<PendingTx, CallError> {
        let chain = upgrade(&self.chain)?;
        let required = chain.reserve_required(amount)? + chain.config.mint_fee;
        let gas_cost = Amount::fee(MINT_GAS, chain.config.gas_price);

        let pending = chain.submit(MINT_GAS, Effect::Mint { amount, value }, |state, account| {
            if state.paused {
                return Err(CallError::new("execution reverted: Pausable: paused"));
            }
            if value < required {
                return Err(CallError::new("execution reverted: insufficient reserve"));
            }
            let native = state.native.get(account).copied().unwrap_or_default();
            if native < value + gas_cost {
                return Err(CallError::new("insufficient funds for gas * price + value"));
            }
            Ok(())
        })?;
        chain.lock().last_mint_value = Some(value);
        Ok(pending)
    }

    async fn burn(&self, amount: Amount) -> Result<PendingTx, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.submit(BURN_GAS, Effect::Burn { amount }, |state, account| {
            if state.paused {
                return Err(CallError::new("execution reverted: Pausable: paused"));
            }
            if state.tokens.get(account).copied().unwrap_or_default() < amount {
                return Err(CallError::new(
                    "execution reverted: ERC20: burn amount exceeds balance",
                ));
            }
            Ok(())
        })
    }
}

struct SimFaucet {
    chain: Weak<SimChain>,
}

#[async_trait]
impl FaucetContract for SimFaucet {
    async fn can_request(&self, account: &Address) -> Result<bool, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("canRequest", |s| {
            chain.next_drip_time(s, account) <= Utc::now().timestamp()
        })
    }

    async fn next_drip_time(&self, account: &Address) -> Result<u64, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("getNextDripTime", |s| {
            chain.next_drip_time(s, account).max(0) as u64
        })
    }

    async fn cooldown_period(&self) -> Result<u64, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("cooldownPeriod", |_| chain.config.cooldown_secs)
    }

    async fn drip_amount(&self) -> Result<Amount, CallError> {
        let chain = upgrade(&self.chain)?;
        chain.view("dripAmount", |_| chain.config.drip_amount)
    }

    async fn request_tokens(&self) -> Result<PendingTx, CallError> {
        let chain = upgrade(&self.chain)?;
        let now = Utc::now().timestamp();
        chain.submit(FAUCET_GAS, Effect::Drip, |state, account| {
            if chain.next_drip_time(state, account) > now {
                return Err(CallError::new("execution reverted: cooldown active"));
            }
            Ok(())
        })
    }
}
