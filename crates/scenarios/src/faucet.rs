//! Faucet token: anyone may mint to themselves

use sightflow_core::EventCategory;

use crate::context::{explain, observe, ScenarioContext};
use crate::error::ScenarioError;
use crate::journal::Journal;
use crate::report::ScenarioReport;
use crate::token::{self, record_decrypted_balance, Minting};

pub const NAME: &str = "faucet";

pub const CLAIM_AMOUNT: u64 = 100;

pub async fn run(ctx: &ScenarioContext) -> Result<ScenarioReport, ScenarioError> {
    let journal = Journal::new();
    let owner = ctx.wallet();
    let claimant = ctx.wallet();
    journal.observe("owner wallet", owner);
    journal.observe("claimant wallet", claimant);

    let token = token::predicted(ctx, owner);
    let callback = EventCategory::oracle_callback(token.address());

    let steps = vec![
        token::initialize(ctx, owner, &token, Minting::Faucet, &journal),
        ctx.step(
            "claim",
            callback.clone(),
            &token,
            move |token| token.connect(claimant).mint(CLAIM_AMOUNT),
            observe(&token, &journal, move |token, journal| {
                journal.observe("claimant balance", explain(token.balance_of(claimant)));
                Ok(())
            }),
        ),
        ctx.step(
            "decrypt_user_balance",
            callback,
            &token,
            move |token| token.connect(claimant).decrypt_user_balance(claimant),
            observe(&token, &journal, move |token, journal| {
                record_decrypted_balance(token, claimant, CLAIM_AMOUNT, journal)
            }),
        ),
    ];

    let workflow = ctx.runner().run(steps).await?;
    ScenarioReport::new(NAME, ctx.chain_id(), workflow, &journal).into_result()
}
