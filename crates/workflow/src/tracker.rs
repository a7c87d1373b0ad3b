//! Single-slot tracking of the in-flight request

use parking_lot::RwLock;
use sightflow_core::CorrelationToken;
use tracing::debug;

/// Holds the correlation token of the most recently issued request
///
/// Each issuance overwrites the slot; no history is kept. Workflows issue
/// requests strictly one at a time, so one slot is enough to decide whether
/// an arriving callback belongs to the current step.
///
/// Reads and writes are guarded, so callback delivery tasks may read the
/// slot while the workflow driver writes it.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: RwLock<Option<CorrelationToken>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly issued request, replacing any previous one
    pub fn set_latest(&self, token: CorrelationToken) {
        let previous = self.latest.write().replace(token.clone());
        debug!(%token, previous = ?previous, "tracking request");
    }

    /// Token of the tracked request, if any
    pub fn current(&self) -> Option<CorrelationToken> {
        self.latest.read().clone()
    }

    /// Stop tracking, returning the token that was tracked
    pub fn clear(&self) -> Option<CorrelationToken> {
        self.latest.write().take()
    }

    pub fn is_tracking(&self) -> bool {
        self.latest.read().is_some()
    }
}
