use sightflow_core::ChainError;
use sightflow_workflow::WorkflowError;
use thiserror::Error;

use crate::report::ScenarioReport;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Setup outside any workflow step failed
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// The run completed but some checks did not hold
    #[error("scenario {} failed {} check(s)", .0.scenario, .0.failed_checks().count())]
    CheckFailed(Box<ScenarioReport>),
}

impl ScenarioError {
    /// The report of a run that completed, if any
    pub fn report(&self) -> Option<&ScenarioReport> {
        match self {
            Self::CheckFailed(report) => Some(report),
            _ => None,
        }
    }
}
