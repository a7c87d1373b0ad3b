//! Shared scenario plumbing

use std::collections::HashSet;
use std::fmt;
use std::future::{ready, Future, Ready};
use std::sync::{Arc, OnceLock};

use sightflow_chain::{ChainConfig, SimulatedChain};
use sightflow_core::{
    Address, CallbackEvent, CapsulatedValue, ChainError, EventCategory, OracleChain, PendingTx,
};
use sightflow_workflow::{
    FlowConfig, HandlerError, StepOutcome, SubscriptionRegistry, WorkflowReport, WorkflowRunner,
    WorkflowStep,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::journal::Journal;

/// Native balance given to every wallet a scenario creates (1 ether)
pub const WALLET_FUNDS: u128 = 1_000_000_000_000_000_000;

/// Chain, registry and runner for one scenario run
///
/// Must be created inside a tokio runtime: the registry is attached to the
/// chain's event stream by a background task, stopped on drop.
pub struct ScenarioContext {
    chain: SimulatedChain,
    runner: WorkflowRunner,
    pump: JoinHandle<()>,
}

impl ScenarioContext {
    pub fn new(chain: ChainConfig, flow: &FlowConfig) -> Self {
        let chain = SimulatedChain::new(chain);
        let registry = SubscriptionRegistry::new();
        let pump = registry.attach(chain.subscribe_events());
        let runner = WorkflowRunner::new(registry, flow);
        Self {
            chain,
            runner,
            pump,
        }
    }

    pub fn chain(&self) -> &SimulatedChain {
        &self.chain
    }

    pub fn runner(&self) -> &WorkflowRunner {
        &self.runner
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id()
    }

    /// A fresh wallet holding [`WALLET_FUNDS`]
    pub fn wallet(&self) -> Address {
        self.chain.create_account(WALLET_FUNDS)
    }

    /// A step whose request is one call on `contract`
    ///
    /// The request id is read from the call's receipt once it is mined.
    pub fn step<T, C, E, EFut>(
        &self,
        name: impl Into<String>,
        category: EventCategory,
        contract: &Deferred<T>,
        call: C,
        effect: E,
    ) -> WorkflowStep
    where
        T: Clone + Send + Sync + 'static,
        C: FnOnce(&T) -> Result<PendingTx, ChainError> + Send + 'static,
        E: Fn(Arc<CallbackEvent>) -> EFut + Send + Sync + 'static,
        EFut: Future<Output = Result<StepOutcome, HandlerError>> + Send + 'static,
    {
        let chain = self.chain.clone();
        let contract = contract.clone();
        WorkflowStep::new(
            name,
            category,
            move || async move {
                let tx = call(&contract.get()?)?;
                chain.await_request_id(&tx).await
            },
            effect,
        )
    }
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("chain", &self.chain)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Drop for ScenarioContext {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A contract that exists once an earlier step has deployed it
///
/// The address is known up front (predicted from the deployer's nonce) so
/// steps can subscribe to the contract's events before it exists.
pub struct Deferred<T> {
    address: Address,
    slot: Arc<OnceLock<T>>,
}

impl<T: Clone> Deferred<T> {
    pub fn pending(address: Address) -> Self {
        Self {
            address,
            slot: Arc::new(OnceLock::new()),
        }
    }

    /// A contract that is already deployed
    pub fn ready(address: Address, contract: T) -> Self {
        let deferred = Self::pending(address);
        deferred.set(contract);
        deferred
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set(&self, contract: T) {
        if self.slot.set(contract).is_err() {
            warn!(address = %self.address, "contract already deployed, keeping the first binding");
        } else {
            debug!(address = %self.address, "contract bound");
        }
    }

    pub fn get(&self) -> Result<T, ChainError> {
        self.slot
            .get()
            .cloned()
            .ok_or(ChainError::UnknownContract(self.address))
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("address", &self.address)
            .field("deployed", &self.slot.get().is_some())
            .finish()
    }
}

/// `explain()` of a contract view, or `unset` before the oracle has answered
pub fn explain(value: Option<CapsulatedValue>) -> String {
    value
        .map(|value| value.explain())
        .unwrap_or_else(|| "unset".to_string())
}

/// Adapt a synchronous effect to the runner's async effect signature
pub fn effect<F>(
    f: F,
) -> impl Fn(Arc<CallbackEvent>) -> Ready<Result<StepOutcome, HandlerError>> + Send + Sync + 'static
where
    F: Fn(&CallbackEvent) -> Result<StepOutcome, HandlerError> + Send + Sync + 'static,
{
    move |event| ready(f(&event))
}

/// Effect that records views of `contract` and completes the step
pub fn observe<T, F>(
    contract: &Deferred<T>,
    journal: &Journal,
    record: F,
) -> impl Fn(Arc<CallbackEvent>) -> Ready<Result<StepOutcome, HandlerError>> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T, &Journal) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    let contract = contract.clone();
    let journal = journal.clone();
    effect(move |_event| {
        record(&contract.get()?, &journal)?;
        Ok(StepOutcome::Complete)
    })
}

/// Every step of the run must have been gated on its own request id
pub fn check_distinct_tokens(journal: &Journal, workflow: &WorkflowReport) -> bool {
    let tokens = workflow.tokens();
    let distinct: HashSet<_> = tokens.iter().collect();
    journal.check(
        "distinct request ids",
        distinct.len() == tokens.len(),
        format!("{} distinct of {}", distinct.len(), tokens.len()),
    )
}
