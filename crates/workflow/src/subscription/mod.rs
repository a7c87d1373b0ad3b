//! Callback subscriptions
//!
//! This module contains the delivery primitives:
//! - [`SubscriptionRegistry`] routing published events to subscriptions
//! - [`Lifetime`] one-shot or persistent delivery
//! - [`Delivery`] what a handler reports back
//! - [`SubscriptionHandle`] / [`SubscriptionGuard`] for explicit cancellation

mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sightflow_core::{CallbackEvent, ChainError, DecodeError};
use thiserror::Error;

pub use registry::{
    HeldSubscription, SubscriptionGuard, SubscriptionHandle, SubscriptionId, SubscriptionRegistry,
};

/// How long a subscription keeps receiving events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// Cancelled after the first accepted delivery
    OneShot,

    /// Active until explicitly unsubscribed
    Persistent,
}

/// Handler verdict on a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event was consumed; one-shot subscriptions cancel themselves
    Accepted,

    /// The event was not for this handler; the subscription stays active
    Ignored,
}

/// Fault raised by a callback handler
///
/// Faults are logged by the registry and never reach other subscriptions.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Handler execution result
pub type HandlerResult = Result<Delivery, HandlerError>;

/// Callback handler function type
pub type CallbackHandler = Arc<
    dyn Fn(Arc<CallbackEvent>) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>>
        + Send
        + Sync,
>;
