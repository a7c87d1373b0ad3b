//! Sharing an encrypted value between contracts
//!
//! `DecryptExample` obtains a random ciphertext and grants it to
//! `DecryptCapsulatedValueExample`, which then asks the oracle to decrypt
//! the shared value. Both steps keep their subscription open until the
//! effect reports completion.

use sightflow_chain::{DecryptCapsulatedValueExample, DecryptExample};
use sightflow_core::{ChainError, OracleChain};
use sightflow_workflow::HandlerError;
use tracing::info;

use crate::context::{explain, observe, Deferred, ScenarioContext};
use crate::error::ScenarioError;
use crate::journal::Journal;
use crate::report::ScenarioReport;

pub const NAME: &str = "acl_share";

pub async fn run(ctx: &ScenarioContext) -> Result<ScenarioReport, ScenarioError> {
    let journal = Journal::new();
    let chain = ctx.chain();
    let deployer = ctx.wallet();

    let example = DecryptCapsulatedValueExample::deploy(chain, deployer)?;
    let decrypt = DecryptExample::deploy(chain, deployer)?;
    info!(
        example = %example.address(),
        decrypt = %decrypt.address(),
        "contracts deployed"
    );
    journal.observe("target before", explain(example.target()));

    chain
        .confirm(&decrypt.share_acl(example.address(), true)?)
        .await?;
    let acl = decrypt.acl();
    journal.check(
        "callback ACL shared",
        acl.contains(&example.address()),
        format!("{acl:?}"),
    );

    let receiver = example.address();
    let source = Deferred::ready(decrypt.address(), decrypt.clone());
    let target = Deferred::ready(example.address(), example.clone());

    let steps = vec![
        ctx.step(
            "decrypt_random_euint64",
            decrypt.oracle_callback(),
            &source,
            DecryptExample::decrypt_random_euint64,
            observe(&source, &journal, move |decrypt, journal| {
                journal.observe("capsulated value", explain(decrypt.capsulated_value()));
                let decrypted = decrypt
                    .decrypted()
                    .ok_or_else(|| HandlerError::failed("random value not decrypted"))?;
                journal.observe("decrypted value", decrypted);

                decrypt.share_encrypted_value(receiver, true)?;
                journal.observe(
                    "encrypted value owners",
                    format!("{:?}", decrypt.encrypted_value_owners()),
                );
                Ok(())
            }),
        )
        .persistent(),
        ctx.step(
            "decrypt_capsulated_value",
            example.oracle_callback(),
            &target,
            {
                let decrypt = decrypt.clone();
                move |example| {
                    let value = decrypt
                        .capsulated_value()
                        .ok_or_else(|| ChainError::reverted("no capsulated value to decrypt"))?;
                    example.decrypt_capsulated_value(&value)
                }
            },
            observe(&target, &journal, move |example, journal| {
                let target = example
                    .target()
                    .ok_or_else(|| HandlerError::failed("target not decrypted"))?;
                journal.observe("target after", target.explain());
                let shared = decrypt
                    .decrypted()
                    .ok_or_else(|| HandlerError::failed("source value missing"))?;
                journal.check_eq("target equals shared value", shared, target.as_u64()?);
                Ok(())
            }),
        )
        .persistent(),
    ];

    let workflow = ctx.runner().run(steps).await?;
    ScenarioReport::new(NAME, ctx.chain_id(), workflow, &journal).into_result()
}
