//! Scenario journal
//!
//! Step effects run inside subscription delivery tasks, so the journal is a
//! cheap clonable handle over shared entries.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A labelled value seen during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub label: String,
    pub value: String,
}

/// An expected/actual comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub label: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

#[derive(Debug, Default)]
struct Entries {
    observations: Vec<Observation>,
    checks: Vec<Check>,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Entries>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, label: impl Into<String>, value: impl fmt::Display) {
        let observation = Observation {
            label: label.into(),
            value: value.to_string(),
        };
        info!(label = %observation.label, value = %observation.value, "observed");
        self.entries.lock().observations.push(observation);
    }

    /// Record whether `actual` equals `expected`; returns the verdict
    pub fn check_eq<T>(&self, label: impl Into<String>, expected: T, actual: T) -> bool
    where
        T: PartialEq + fmt::Display,
    {
        let passed = expected == actual;
        self.record(Check {
            label: label.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            passed,
        });
        passed
    }

    /// Record a boolean check with a free-form description of what was seen
    pub fn check(&self, label: impl Into<String>, passed: bool, actual: impl fmt::Display) -> bool {
        self.record(Check {
            label: label.into(),
            expected: "true".to_string(),
            actual: actual.to_string(),
            passed,
        });
        passed
    }

    fn record(&self, check: Check) {
        if check.passed {
            info!(label = %check.label, actual = %check.actual, "check passed");
        } else {
            warn!(
                label = %check.label,
                expected = %check.expected,
                actual = %check.actual,
                "check failed"
            );
        }
        self.entries.lock().checks.push(check);
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.entries.lock().observations.clone()
    }

    pub fn checks(&self) -> Vec<Check> {
        self.entries.lock().checks.clone()
    }
}
