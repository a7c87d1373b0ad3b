//! Random euint64 pair, encrypted sum, decryption of everything

use sightflow_chain::{AsyncDecryptExample, RESULT_SLOTS};
use sightflow_core::{CapsulatedValue, ChainError};
use sightflow_workflow::{HandlerError, StepOutcome};
use tracing::info;

use crate::context::{effect, explain, Deferred, ScenarioContext};
use crate::error::ScenarioError;
use crate::journal::Journal;
use crate::report::ScenarioReport;

pub const NAME: &str = "async_decrypt";

/// Request two random values and check the oracle's sum
///
/// With `operands`, the contract uses them instead of random values and the
/// decrypted sum is also checked against `a + b` computed locally.
pub async fn run(
    ctx: &ScenarioContext,
    operands: Option<(u64, u64)>,
) -> Result<ScenarioReport, ScenarioError> {
    let journal = Journal::new();
    let deployer = ctx.wallet();
    let example = AsyncDecryptExample::deploy(ctx.chain(), deployer)?;
    info!(contract = %example.address(), "AsyncDecryptExample deployed");

    if let Some((a, b)) = operands {
        example.pin_operands(a, b);
    }
    journal.observe("result before request", explain(example.result()));

    let contract = Deferred::ready(example.address(), example.clone());
    let step = ctx.step(
        "async_decrypt_random_euint64",
        example.oracle_callback(),
        &contract,
        AsyncDecryptExample::async_decrypt_random_euint64,
        effect({
            let example = example.clone();
            let journal = journal.clone();
            move |_event| {
                record_results(&example.results(), &journal)?;
                Ok(StepOutcome::Complete)
            }
        }),
    );

    let workflow = ctx.runner().run(vec![step]).await?;

    if let Some((a, b)) = operands {
        let sum = example
            .result()
            .ok_or_else(|| ChainError::reverted("no result after callback"))?
            .as_u64()
            .map_err(ChainError::from)?;
        journal.check_eq("pinned a + b", a.wrapping_add(b), sum);
    }

    ScenarioReport::new(NAME, ctx.chain_id(), workflow, &journal).into_result()
}

fn record_results(results: &[CapsulatedValue], journal: &Journal) -> Result<(), HandlerError> {
    if results.len() != RESULT_SLOTS {
        return Err(HandlerError::failed(format!(
            "expected {RESULT_SLOTS} result slots, found {}",
            results.len()
        )));
    }

    for (label, slot) in [
        ("encrypted a", 0),
        ("a", 1),
        ("encrypted a >= b", 2),
        ("a >= b", 3),
        ("encrypted b", 4),
        ("b", 5),
        ("encrypted a + b", 6),
        ("a + b", 7),
    ] {
        journal.observe(label, results[slot].explain());
    }

    let a = results[1].as_u64()?;
    let b = results[5].as_u64()?;
    let sum = results[7].as_u64()?;
    journal.check_eq("a + b mod 2^64", a.wrapping_add(b), sum);
    Ok(())
}
