//! # Sequential Oracle Workflows
//!
//! Drives multi-step workflows whose every step ends in an asynchronous
//! oracle callback.
//!
//! ## Features
//!
//! - **Request tracking**: the latest issued correlation token, one slot
//! - **Subscriptions**: one-shot or persistent callback delivery with fault isolation
//! - **Correlation validation**: only callbacks carrying the tracked token run effects
//! - **Bounded barrier**: polling wait with an explicit timeout between steps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRunner                          │
//! │  (issue -> track -> subscribe -> await barrier -> next)     │
//! └─────────────────────────────────────────────────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌────────────────────┐ ┌──────────────────┐
//! │  RequestTracker  │ │SubscriptionRegistry│ │SequentialBarrier │
//! │  (latest token)  │ │ (per-subscription  │ │ (poll + deadline)│
//! └──────────────────┘ │  delivery tasks)   │ └──────────────────┘
//!            ▲         └────────────────────┘          ▲
//!            │                    │                    │
//!            │                    ▼                    │
//!            │         ┌────────────────────┐          │
//!            └─────────│CorrelationValidator│──────────┘
//!                      │ match / mismatch / │  (match runs effect,
//!                      │ stale              │   sets completion flag)
//!                      └────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use sightflow_workflow::prelude::*;
//!
//! let registry = SubscriptionRegistry::new();
//! registry.attach(chain.subscribe_events());
//!
//! let runner = WorkflowRunner::new(registry, &FlowConfig::default());
//! let report = runner
//!     .run(vec![WorkflowStep::new(
//!         "mint",
//!         EventCategory::oracle_callback(token.address()),
//!         move || async move { chain.await_request_id(&token.mint(1000)?).await },
//!         |_event| async { Ok(StepOutcome::Complete) },
//!     )])
//!     .await?;
//! ```

pub mod barrier;
pub mod config;
pub mod runner;
pub mod subscription;
pub mod tracker;
pub mod validator;

/// Prelude for common imports
pub mod prelude {
    pub use crate::barrier::{BarrierError, CompletionFlag, SequentialBarrier};
    pub use crate::config::{ConfigError, FlowConfig};
    pub use crate::runner::{
        StepOutcome, StepRecord, WorkflowError, WorkflowReport, WorkflowRunner, WorkflowStep,
    };
    pub use crate::subscription::{
        Delivery, HandlerError, Lifetime, SubscriptionGuard, SubscriptionHandle,
        SubscriptionRegistry,
    };
    pub use crate::tracker::RequestTracker;
    pub use crate::validator::{Correlation, CorrelationValidator};
    pub use sightflow_core::{CallbackEvent, CorrelationToken, EventCategory};
}

// Re-export key types at crate root
pub use barrier::{BarrierError, CompletionFlag, SequentialBarrier};
pub use config::{ConfigError, FlowConfig};
pub use runner::{
    StepOutcome, StepRecord, WorkflowError, WorkflowReport, WorkflowRunner, WorkflowStep,
};
pub use subscription::{
    Delivery, HandlerError, Lifetime, SubscriptionGuard, SubscriptionHandle, SubscriptionRegistry,
};
pub use tracker::RequestTracker;
pub use validator::{Correlation, CorrelationValidator};
