//! Correlation of arriving callbacks with the tracked request

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sightflow_core::{CallbackEvent, CorrelationToken};
use tracing::{debug, warn};

use crate::tracker::RequestTracker;

/// Classification of a callback against the tracked request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correlation {
    /// The callback answers the tracked request
    Match,

    /// A request is tracked, but the callback answers a different one
    Mismatch { expected: CorrelationToken },

    /// No request is tracked
    Stale,
}

impl Correlation {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compares callback tokens with the [`RequestTracker`] slot
///
/// Only [`Correlation::Match`] authorizes a step's effect. Mismatched and
/// stale callbacks are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct CorrelationValidator {
    tracker: Arc<RequestTracker>,
}

impl CorrelationValidator {
    pub fn new(tracker: Arc<RequestTracker>) -> Self {
        Self { tracker }
    }

    /// Classify `event` against the token tracked at this moment
    pub fn validate(&self, event: &CallbackEvent) -> Correlation {
        match self.tracker.current() {
            Some(expected) if expected == event.token => {
                debug!(
                    category = %event.category,
                    token = %event.token,
                    "callback matched tracked request"
                );
                Correlation::Match
            }
            Some(expected) => {
                warn!(
                    category = %event.category,
                    token = %event.token,
                    %expected,
                    "callback token does not match tracked request, discarding"
                );
                Correlation::Mismatch { expected }
            }
            None => {
                warn!(
                    category = %event.category,
                    token = %event.token,
                    "callback arrived with no tracked request, discarding"
                );
                Correlation::Stale
            }
        }
    }
}
