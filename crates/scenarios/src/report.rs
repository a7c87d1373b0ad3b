use serde::{Deserialize, Serialize};
use sightflow_workflow::WorkflowReport;

use crate::error::ScenarioError;
use crate::journal::{Check, Journal, Observation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub chain_id: u64,
    pub workflow: WorkflowReport,
    pub observations: Vec<Observation>,
    pub checks: Vec<Check>,
}

impl ScenarioReport {
    pub fn new(
        scenario: impl Into<String>,
        chain_id: u64,
        workflow: WorkflowReport,
        journal: &Journal,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            chain_id,
            workflow,
            observations: journal.observations(),
            checks: journal.checks(),
        }
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|check| !check.passed)
    }

    pub fn observation(&self, label: &str) -> Option<&str> {
        self.observations
            .iter()
            .rev()
            .find(|observation| observation.label == label)
            .map(|observation| observation.value.as_str())
    }

    /// `Ok(self)` when every check passed
    pub fn into_result(self) -> Result<Self, ScenarioError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ScenarioError::CheckFailed(Box::new(self)))
        }
    }
}
