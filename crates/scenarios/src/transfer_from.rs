//! Allowance spending
//!
//! A second wallet is funded with native currency, approved by the token
//! owner, and pulls tokens to itself with `transfer_from`. That step waits
//! for the `Transfer` event rather than the oracle callback.

use sightflow_core::{event_names, ChainError, EventCategory, OracleChain};

use crate::context::{check_distinct_tokens, explain, observe, ScenarioContext};
use crate::error::ScenarioError;
use crate::journal::Journal;
use crate::report::ScenarioReport;
use crate::token::{self, record_decrypted_balance, Minting};

pub const NAME: &str = "transfer_from";

/// Native currency sent to the spender (0.0001 ether)
pub const FUNDING: u128 = 100_000_000_000_000;

pub const MINT_AMOUNT: u64 = 1000;
pub const ALLOWANCE: u64 = 10_000;
pub const SPEND_AMOUNT: u64 = 500;

pub async fn run(ctx: &ScenarioContext) -> Result<ScenarioReport, ScenarioError> {
    let journal = Journal::new();
    let chain = ctx.chain();
    let owner = ctx.wallet();
    let spender = chain.create_account(0);

    journal.observe("spender native balance before funding", chain.balance(spender));
    let funding = chain.transfer_native(owner, spender, FUNDING)?;
    let receipt = chain.confirm(&funding).await?;
    if !receipt.is_success() {
        return Err(ChainError::reverted("funding transfer failed").into());
    }
    journal.observe("spender native balance after funding", chain.balance(spender));
    journal.check_eq("spender funded", FUNDING, chain.balance(spender));

    // Predicted after funding: the transfer consumed one of the owner's nonces
    let token = token::predicted(ctx, owner);
    let callback = EventCategory::oracle_callback(token.address());
    let transfer = EventCategory::new(token.address(), event_names::TRANSFER);

    let steps = vec![
        token::initialize(ctx, owner, &token, Minting::Owner, &journal),
        ctx.step(
            "mint",
            callback.clone(),
            &token,
            |token| token.mint(MINT_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("owner balance after mint", explain(token.balance_of(owner)));
                Ok(())
            }),
        ),
        ctx.step(
            "approve",
            callback.clone(),
            &token,
            move |token| token.approve(spender, ALLOWANCE),
            observe(&token, &journal, move |token, journal| {
                journal.observe("allowance", explain(token.allowance(owner, spender)));
                Ok(())
            }),
        ),
        ctx.step(
            "transfer_from",
            transfer,
            &token,
            move |token| {
                token
                    .connect(spender)
                    .transfer_from(owner, spender, SPEND_AMOUNT)
            },
            observe(&token, &journal, move |token, journal| {
                journal.observe("remaining allowance", explain(token.allowance(owner, spender)));
                journal.observe("spender balance", explain(token.balance_of(spender)));
                Ok(())
            }),
        ),
        ctx.step(
            "decrypt_user_balance",
            callback,
            &token,
            move |token| token.decrypt_user_balance(spender),
            observe(&token, &journal, move |token, journal| {
                record_decrypted_balance(token, spender, SPEND_AMOUNT, journal)
            }),
        ),
    ];

    let workflow = ctx.runner().run(steps).await?;
    check_distinct_tokens(&journal, &workflow);

    ScenarioReport::new(NAME, ctx.chain_id(), workflow, &journal).into_result()
}
