//! # Oracle Workflow Scenarios
//!
//! End-to-end workflows against the simulated oracle chain. Each scenario
//! deploys its contracts, runs its steps through a
//! [`WorkflowRunner`](sightflow_workflow::WorkflowRunner) and returns a
//! [`ScenarioReport`] with the workflow timings, what the step effects
//! observed, and the checks that must hold.
//!
//! | scenario | what it shows |
//! |----------|---------------|
//! | [`Scenario::AsyncDecrypt`] | one request, eight result slots, `a + b` mod 2^64 |
//! | [`Scenario::TokenLifecycle`] | six dependent token operations, distinct request ids |
//! | [`Scenario::TransferFrom`] | allowance spending gated on the `Transfer` event |
//! | [`Scenario::AclShare`] | persistent steps, ciphertext shared across contracts |
//! | [`Scenario::Faucet`] | faucet deployment and self-service minting |
//!
//! ## Example
//!
//! ```ignore
//! use sightflow_scenarios::prelude::*;
//!
//! let ctx = ScenarioContext::new(ChainConfig::from_env()?, &FlowConfig::from_env()?);
//! let report = Scenario::TokenLifecycle.run(&ctx).await?;
//! assert!(report.passed());
//! ```

pub mod acl_share;
pub mod async_decrypt;
pub mod context;
pub mod error;
pub mod faucet;
pub mod journal;
pub mod report;
pub mod token;
pub mod token_lifecycle;
pub mod transfer_from;

use serde::{Deserialize, Serialize};

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::ScenarioContext;
    pub use crate::error::ScenarioError;
    pub use crate::report::ScenarioReport;
    pub use crate::Scenario;
    pub use sightflow_chain::ChainConfig;
    pub use sightflow_workflow::FlowConfig;
}

// Re-export key types at crate root
pub use context::{Deferred, ScenarioContext, WALLET_FUNDS};
pub use error::ScenarioError;
pub use journal::{Check, Journal, Observation};
pub use report::ScenarioReport;

/// The demonstration workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Optionally pinned operands `(a, b)`
    AsyncDecrypt(Option<(u64, u64)>),
    TokenLifecycle,
    TransferFrom,
    AclShare,
    Faucet,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AsyncDecrypt(_) => async_decrypt::NAME,
            Self::TokenLifecycle => token_lifecycle::NAME,
            Self::TransferFrom => transfer_from::NAME,
            Self::AclShare => acl_share::NAME,
            Self::Faucet => faucet::NAME,
        }
    }

    pub async fn run(self, ctx: &ScenarioContext) -> Result<ScenarioReport, ScenarioError> {
        tracing::info!(scenario = self.name(), chain_id = ctx.chain_id(), "running scenario");
        match self {
            Self::AsyncDecrypt(operands) => async_decrypt::run(ctx, operands).await,
            Self::TokenLifecycle => token_lifecycle::run(ctx).await,
            Self::TransferFrom => transfer_from::run(ctx).await,
            Self::AclShare => acl_share::run(ctx).await,
            Self::Faucet => faucet::run(ctx).await,
        }
    }
}
