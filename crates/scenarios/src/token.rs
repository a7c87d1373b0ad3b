//! Confidential token steps shared by the token scenarios

use sightflow_chain::ConfidentialErc20;
use sightflow_core::{Address, ChainError, EventCategory, OracleChain, ShortHex};
use sightflow_workflow::{HandlerError, WorkflowStep};
use tracing::info;

use crate::context::{explain, observe, Deferred, ScenarioContext};
use crate::journal::Journal;

pub const TOKEN_NAME: &str = "MyCToken";
pub const TOKEN_SYMBOL: &str = "MCT";

/// How the token is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Minting {
    /// Only the owner mints
    Owner,
    /// Anyone mints to themselves
    Faucet,
}

/// Token to be deployed by `owner`'s next transaction
pub fn predicted(ctx: &ScenarioContext, owner: Address) -> Deferred<ConfidentialErc20> {
    Deferred::pending(ctx.chain().predict_address(owner))
}

/// Deploy the token with an encrypted zero supply and await its constructor callback
pub fn initialize(
    ctx: &ScenarioContext,
    owner: Address,
    token: &Deferred<ConfidentialErc20>,
    minting: Minting,
    journal: &Journal,
) -> WorkflowStep {
    let chain = ctx.chain().clone();
    let slot = token.clone();
    WorkflowStep::new(
        "initialize",
        EventCategory::initialize_callback(token.address()),
        move || async move {
            let zero = chain.encrypt_u64(owner, 0);
            let (contract, tx) = match minting {
                Minting::Owner => {
                    ConfidentialErc20::deploy(&chain, owner, TOKEN_NAME, TOKEN_SYMBOL, &zero)?
                }
                Minting::Faucet => {
                    ConfidentialErc20::deploy_faucet(&chain, owner, TOKEN_NAME, TOKEN_SYMBOL, &zero)?
                }
            };
            // Subscribed at the predicted address; anything else would never complete
            if contract.address() != slot.address() {
                return Err(ChainError::UnknownContract(slot.address()));
            }
            info!(contract = %contract.address(), ?minting, "token deployed");
            slot.set(contract);
            chain.await_request_id(&tx).await
        },
        observe(token, journal, move |token, journal| {
            journal.observe("initial value", explain(token.initial_value()));
            let initial = token
                .result()
                .ok_or_else(|| HandlerError::failed("initial value not decrypted"))?;
            journal.observe("decrypted initial value", initial);
            journal.check_eq("initial supply", 0, initial);
            Ok(())
        }),
    )
}

/// Record the plaintext balance published for `user` and check it
pub fn record_decrypted_balance(
    token: &ConfidentialErc20,
    user: Address,
    expected: u64,
    journal: &Journal,
) -> Result<(), HandlerError> {
    let balance = token
        .decrypted_balance(user)
        .ok_or_else(|| HandlerError::failed(format!("no decrypted balance for {user}")))?;
    journal.observe(format!("decrypted balance of {}", user.short()), balance);
    journal.check_eq("decrypted balance", expected, balance);
    Ok(())
}
