//! Callback events pushed by the oracle collaborator

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::primitives::{Address, ShortHex};
use crate::token::CorrelationToken;

/// Event names emitted by the oracle-backed contracts
pub mod event_names {
    /// Emitted when the oracle answers a request
    pub const ORACLE_CALLBACK: &str = "OracleCallback";

    /// Emitted when the oracle answers a contract's constructor request
    pub const INITIALIZE_ORACLE_CALLBACK: &str = "InitializeOracleCallback";

    /// Token transfer settled by the oracle
    pub const TRANSFER: &str = "Transfer";
}

/// The stream of events a subscription listens to: one event name on one emitter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventCategory {
    pub emitter: Address,
    pub event: String,
}

impl EventCategory {
    pub fn new(emitter: Address, event: impl Into<String>) -> Self {
        Self {
            emitter,
            event: event.into(),
        }
    }

    pub fn oracle_callback(emitter: Address) -> Self {
        Self::new(emitter, event_names::ORACLE_CALLBACK)
    }

    pub fn initialize_callback(emitter: Address) -> Self {
        Self::new(emitter, event_names::INITIALIZE_ORACLE_CALLBACK)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.event, self.emitter.short())
    }
}

/// Completion notification for an oracle request
///
/// Immutable once emitted. The token is the request id the contract
/// attached to the callback; the payload is whatever the event carried
/// besides it.
///
/// # Example
///
/// ```
/// use sightflow_core::{Address, CallbackEvent, CorrelationToken, EventCategory};
///
/// let event = CallbackEvent::new(
///     EventCategory::oracle_callback(Address::ZERO),
///     CorrelationToken::random(),
///     serde_json::json!({ "slot": 7 }),
/// );
/// assert_eq!(event.category.event, "OracleCallback");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackEvent {
    /// Emitter and event name
    pub category: EventCategory,

    /// Request id the callback answers
    pub token: CorrelationToken,

    /// Event payload (JSON)
    pub payload: serde_json::Value,

    /// When the event was emitted
    pub emitted_at: DateTime<Utc>,
}

impl CallbackEvent {
    pub fn new(
        category: EventCategory,
        token: CorrelationToken,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            category,
            token,
            payload,
            emitted_at: Utc::now(),
        }
    }

    /// Deserialize the payload into a typed value
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
