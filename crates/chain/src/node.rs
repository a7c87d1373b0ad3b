//! In-process oracle chain
//!
//! Transactions are mined the moment they are submitted: the sender's nonce
//! advances, a block is appended and a receipt is stored. If the call opened
//! an oracle request, the receipt carries its request id and the oracle
//! answers on a spawned task after the configured latency, emitting a
//! callback event to every subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sightflow_core::{
    Address, CallbackEvent, CapsulatedValue, ChainError, CorrelationToken, EventCategory,
    OracleChain, PendingTx, Receipt, ShortHex, TxHash, TxStatus, ValueKind,
};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::config::ChainConfig;
use crate::coprocessor::Coprocessor;

/// Mutable chain state shared by every contract on the chain
#[derive(Debug, Default)]
pub struct ChainState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, u128>,
    receipts: HashMap<TxHash, Receipt>,
    pub coprocessor: Coprocessor,
}

/// What a mined call hands back to the chain
#[derive(Debug, Default)]
pub struct CallEffect {
    /// Oracle request opened by the call
    pub request: Option<CorrelationToken>,
}

impl CallEffect {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn request(token: CorrelationToken) -> Self {
        Self {
            request: Some(token),
        }
    }
}

/// One event the oracle emits when answering a request
#[derive(Debug, Clone)]
pub struct Emission {
    pub emitter: Address,
    pub event: &'static str,
    pub payload: Value,
}

impl Emission {
    pub fn new(emitter: Address, event: &'static str, payload: Value) -> Self {
        Self {
            emitter,
            event,
            payload,
        }
    }
}

struct ChainInner {
    config: ChainConfig,
    events: broadcast::Sender<CallbackEvent>,
    state: Mutex<ChainState>,
}

/// Simulated chain with an attached oracle
///
/// Cloning is cheap; clones share state and the event stream.
///
/// # Example
///
/// ```ignore
/// let chain = SimulatedChain::new(ChainConfig::default());
/// let deployer = chain.create_account(10u128.pow(18));
/// let example = AsyncDecryptExample::deploy(&chain, deployer)?;
///
/// let tx = example.async_decrypt_random_euint64()?;
/// let request_id = chain.await_request_id(&tx).await?;
/// ```
#[derive(Clone)]
pub struct SimulatedChain {
    inner: Arc<ChainInner>,
}

impl SimulatedChain {
    pub fn new(config: ChainConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        info!(
            chain_id = config.chain_id,
            latency_ms = config.callback_latency.as_millis() as u64,
            noise = config.noise,
            redeliver = config.redeliver,
            "simulated chain started"
        );
        Self {
            inner: Arc::new(ChainInner {
                config,
                events,
                state: Mutex::new(ChainState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.inner.config
    }

    pub fn chain_id(&self) -> u64 {
        self.inner.config.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.inner.state.lock().block_number
    }

    /// Create a wallet holding `funds` wei
    pub fn create_account(&self, funds: u128) -> Address {
        let account = Address::random();
        if funds > 0 {
            self.inner.state.lock().balances.insert(account, funds);
        }
        debug!(account = %account.short(), funds, "account created");
        account
    }

    pub fn balance(&self, account: Address) -> u128 {
        self.inner
            .state
            .lock()
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    pub fn nonce(&self, account: Address) -> u64 {
        self.inner
            .state
            .lock()
            .nonces
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    /// Address the next contract deployed by `deployer` will land at
    pub fn predict_address(&self, deployer: Address) -> Address {
        contract_address(deployer, self.nonce(deployer))
    }

    /// Move native currency between accounts
    pub fn transfer_native(
        &self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<PendingTx, ChainError> {
        let tx = self.submit(from, |state| {
            let available = state.balances.get(&from).copied().unwrap_or(0);
            if available < amount {
                return Err(ChainError::reverted(format!(
                    "insufficient funds: have {available}, need {amount}"
                )));
            }
            state.balances.insert(from, available - amount);
            *state.balances.entry(to).or_insert(0) += amount;
            Ok(CallEffect::none())
        })?;
        info!(from = %from.short(), to = %to.short(), amount, "native transfer");
        Ok(tx)
    }

    /// Deploy a contract from `deployer`, returning its address
    ///
    /// `init` runs against the chain state with the new address and may open
    /// a constructor request.
    pub fn deploy<F>(&self, deployer: Address, init: F) -> Result<(Address, PendingTx), ChainError>
    where
        F: FnOnce(Address, &mut ChainState) -> Result<CallEffect, ChainError>,
    {
        let mut deployed = Address::ZERO;
        let tx = self.submit(deployer, |state| {
            let nonce = state.nonces.get(&deployer).copied().unwrap_or(0);
            deployed = contract_address(deployer, nonce);
            init(deployed, state)
        })?;
        info!(contract = %deployed, deployer = %deployer.short(), "contract deployed");
        Ok((deployed, tx))
    }

    /// Mine a call from `from`
    ///
    /// A call that fails leaves the state untouched and surfaces as a revert.
    /// Calls must validate before they mutate.
    pub fn submit<F>(&self, from: Address, call: F) -> Result<PendingTx, ChainError>
    where
        F: FnOnce(&mut ChainState) -> Result<CallEffect, ChainError>,
    {
        let mut state = self.inner.state.lock();
        let effect = match call(&mut state) {
            Ok(effect) => effect,
            Err(e) => {
                warn!(from = %from.short(), error = %e, "call rejected");
                return Err(e);
            }
        };

        *state.nonces.entry(from).or_insert(0) += 1;
        state.block_number += 1;
        let hash = TxHash::random();
        let receipt = Receipt {
            hash,
            block_number: state.block_number,
            status: TxStatus::Success,
            request_id: effect.request,
        };
        trace!(%hash, block = receipt.block_number, request = ?receipt.request_id, "transaction mined");
        state.receipts.insert(hash, receipt);

        Ok(PendingTx { hash })
    }

    /// Client-side encryption of `value` for use by `owner`
    pub fn encrypt_u64(&self, owner: Address, value: u64) -> CapsulatedValue {
        let mut state = self.inner.state.lock();
        let handle = state.coprocessor.encrypt(ValueKind::Euint64, value, owner);
        CapsulatedValue::encrypted(ValueKind::Euint64, handle.as_bytes().to_vec())
    }

    /// Mint a new oracle request id
    pub fn open_request(&self) -> CorrelationToken {
        let token = CorrelationToken::random();
        debug!(request = %token, "oracle request opened");
        token
    }

    /// Answer request `token` after the configured latency
    ///
    /// `resolve` runs on the oracle task with the chain state locked and
    /// returns the events to emit, all tagged with `token`. Resolution
    /// failures are logged and nothing is emitted.
    pub fn fulfil<F>(&self, token: CorrelationToken, resolve: F)
    where
        F: FnOnce(&mut ChainState) -> Result<Vec<Emission>, ChainError> + Send + 'static,
    {
        let chain = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(chain.inner.config.callback_latency).await;

            let emissions = {
                let mut state = chain.inner.state.lock();
                match resolve(&mut state) {
                    Ok(emissions) => emissions,
                    Err(e) => {
                        warn!(request = %token, error = %e, "oracle failed to resolve request");
                        return;
                    }
                }
            };

            if chain.inner.config.noise {
                if let Some(first) = emissions.first() {
                    let stray = CallbackEvent::new(
                        EventCategory::new(first.emitter, first.event),
                        CorrelationToken::random(),
                        Value::Null,
                    );
                    debug!(category = %stray.category, "emitting stray callback");
                    chain.emit(stray);
                }
            }

            let deliveries = if chain.inner.config.redeliver { 2 } else { 1 };
            for _ in 0..deliveries {
                for emission in &emissions {
                    chain.emit(CallbackEvent::new(
                        EventCategory::new(emission.emitter, emission.event),
                        token.clone(),
                        emission.payload.clone(),
                    ));
                }
            }
        });
    }

    /// Push an event to every subscriber, returning how many received it
    pub fn emit(&self, event: CallbackEvent) -> usize {
        let category = event.category.clone();
        let token = event.token.clone();
        match self.inner.events.send(event) {
            Ok(receivers) => {
                debug!(%category, %token, receivers, "event emitted");
                receivers
            }
            Err(_) => {
                debug!(%category, %token, "event emitted with no subscribers");
                0
            }
        }
    }

    /// Run `f` against the chain state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.inner.state.lock().receipts.get(hash).cloned()
    }
}

impl std::fmt::Debug for SimulatedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedChain")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OracleChain for SimulatedChain {
    async fn confirm(&self, tx: &PendingTx) -> Result<Receipt, ChainError> {
        let receipt = self
            .receipt(&tx.hash)
            .ok_or(ChainError::UnknownTransaction(tx.hash))?;
        if !receipt.is_success() {
            return Err(ChainError::reverted(format!("transaction {} failed", tx.hash)));
        }
        Ok(receipt)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<CallbackEvent> {
        self.inner.events.subscribe()
    }
}

/// CREATE address of the contract `deployer` deploys at `nonce`
pub fn contract_address(deployer: Address, nonce: u64) -> Address {
    deployer.create(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chain() -> SimulatedChain {
        SimulatedChain::new(ChainConfig::new().with_callback_latency(Duration::from_millis(5)))
    }

    #[tokio::test]
    async fn test_submit_mines_and_confirms() {
        let chain = chain();
        let sender = chain.create_account(0);

        let token = chain.open_request();
        let tx = chain
            .submit(sender, |_| Ok(CallEffect::request(token.clone())))
            .unwrap();

        let receipt = chain.confirm(&tx).await.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.request_id, Some(token.clone()));
        assert_eq!(chain.await_request_id(&tx).await.unwrap(), token);
        assert_eq!(chain.nonce(sender), 1);
    }

    #[tokio::test]
    async fn test_rejected_call_changes_nothing() {
        let chain = chain();
        let sender = chain.create_account(0);

        let err = chain
            .submit(sender, |_| Err(ChainError::reverted("nope")))
            .unwrap_err();
        assert_eq!(err, ChainError::reverted("nope"));
        assert_eq!(chain.nonce(sender), 0);
        assert_eq!(chain.block_number(), 0);
    }

    #[tokio::test]
    async fn test_call_without_request() {
        let chain = chain();
        let sender = chain.create_account(0);
        let tx = chain.submit(sender, |_| Ok(CallEffect::none())).unwrap();

        let err = chain.await_request_id(&tx).await.unwrap_err();
        assert_eq!(err, ChainError::NoRequestIssued(tx.hash));
    }

    #[tokio::test]
    async fn test_native_transfer() {
        let chain = chain();
        let faucet = chain.create_account(1_000);
        let user = chain.create_account(0);

        chain.transfer_native(faucet, user, 400).unwrap();
        assert_eq!(chain.balance(faucet), 600);
        assert_eq!(chain.balance(user), 400);

        let err = chain.transfer_native(user, faucet, 401).unwrap_err();
        assert!(matches!(err, ChainError::Reverted { .. }));
        assert_eq!(chain.balance(user), 400);
    }

    #[tokio::test]
    async fn test_predicted_address_matches_deployment() {
        let chain = chain();
        let deployer = chain.create_account(0);
        chain.submit(deployer, |_| Ok(CallEffect::none())).unwrap();

        let predicted = chain.predict_address(deployer);
        let (deployed, _) = chain
            .deploy(deployer, |_, _| Ok(CallEffect::none()))
            .unwrap();
        assert_eq!(predicted, deployed);
        assert_ne!(chain.predict_address(deployer), deployed);
    }

    #[tokio::test]
    async fn test_fulfil_emits_tagged_events() {
        let chain = chain();
        let mut events = chain.subscribe_events();
        let emitter = Address::random();
        let token = chain.open_request();

        chain.fulfil(token.clone(), move |_| {
            Ok(vec![Emission::new(
                emitter,
                sightflow_core::event_names::ORACLE_CALLBACK,
                serde_json::json!({ "value": 7 }),
            )])
        });

        let event = events.recv().await.unwrap();
        assert_eq!(event.token, token);
        assert_eq!(event.category, EventCategory::oracle_callback(emitter));
        assert_eq!(event.payload["value"], 7);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let chain = SimulatedChain::new(
            ChainConfig::new()
                .with_callback_latency(Duration::ZERO)
                .with_noise(true)
                .with_redelivery(true),
        );
        let mut events = chain.subscribe_events();
        let emitter = Address::random();
        let token = chain.open_request();

        chain.fulfil(token.clone(), move |_| {
            Ok(vec![Emission::new(
                emitter,
                sightflow_core::event_names::ORACLE_CALLBACK,
                Value::Null,
            )])
        });

        let stray = events.recv().await.unwrap();
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_ne!(stray.token, token);
        assert_eq!(first.token, token);
        assert_eq!(second.token, token);
    }

    #[test]
    fn test_contract_address_uses_create_rule() {
        let deployer: Address = "0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0".parse().unwrap();
        let first: Address = "0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d".parse().unwrap();
        let second: Address = "0x343c43a37d37dff08ae8c4a11544c718abb4fcf8".parse().unwrap();
        assert_eq!(contract_address(deployer, 0), first);
        assert_eq!(contract_address(deployer, 1), second);
    }
}
