//! Confidential token lifecycle
//!
//! initialize, mint, burn, transfer to a second wallet, decrypt that
//! wallet's balance, approve. Every step waits for its own callback.

use sightflow_core::EventCategory;

use crate::context::{check_distinct_tokens, explain, observe, ScenarioContext};
use crate::error::ScenarioError;
use crate::journal::Journal;
use crate::report::ScenarioReport;
use crate::token::{self, record_decrypted_balance, Minting};

pub const NAME: &str = "token_lifecycle";

pub const MINT_AMOUNT: u64 = 1000;
pub const BURN_AMOUNT: u64 = 500;
pub const TRANSFER_AMOUNT: u64 = 500;
pub const APPROVE_AMOUNT: u64 = 100;

pub async fn run(ctx: &ScenarioContext) -> Result<ScenarioReport, ScenarioError> {
    let journal = Journal::new();
    let owner = ctx.wallet();
    let user = ctx.wallet();
    let token = token::predicted(ctx, owner);
    let callback = EventCategory::oracle_callback(token.address());

    let steps = vec![
        token::initialize(ctx, owner, &token, Minting::Owner, &journal),
        ctx.step(
            "mint",
            callback.clone(),
            &token,
            |token| token.mint(MINT_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("total supply after mint", explain(token.total_supply()));
                journal.observe("owner balance after mint", explain(token.balance_of(owner)));
                Ok(())
            }),
        ),
        ctx.step(
            "burn",
            callback.clone(),
            &token,
            |token| token.burn(BURN_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("total supply after burn", explain(token.total_supply()));
                journal.observe("owner balance after burn", explain(token.balance_of(owner)));
                Ok(())
            }),
        ),
        ctx.step(
            "transfer",
            callback.clone(),
            &token,
            move |token| token.transfer(user, TRANSFER_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("owner balance after transfer", explain(token.balance_of(owner)));
                journal.observe("user balance after transfer", explain(token.balance_of(user)));
                Ok(())
            }),
        ),
        ctx.step(
            "decrypt_user_balance",
            callback.clone(),
            &token,
            move |token| token.decrypt_user_balance(user),
            observe(&token, &journal, move |token, journal| {
                record_decrypted_balance(token, user, TRANSFER_AMOUNT, journal)
            }),
        ),
        ctx.step(
            "approve",
            callback,
            &token,
            move |token| token.approve(user, APPROVE_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("allowance", explain(token.allowance(owner, user)));
                Ok(())
            }),
        ),
    ];

    let workflow = ctx.runner().run(steps).await?;
    check_distinct_tokens(&journal, &workflow);

    ScenarioReport::new(NAME, ctx.chain_id(), workflow, &journal).into_result()
}
