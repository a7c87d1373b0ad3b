//! Sequential workflow driver
//!
//! Each step issues one oracle request and waits for the callback carrying
//! that request's token before the next step is issued.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sightflow_core::{CallbackEvent, ChainError, CorrelationToken, EventCategory};
use thiserror::Error;
use tracing::{debug, error, info, instrument, Span};
use uuid::Uuid;

use crate::barrier::{BarrierError, CompletionFlag, SequentialBarrier};
use crate::config::FlowConfig;
use crate::subscription::{Delivery, HandlerError, Lifetime, SubscriptionRegistry};
use crate::tracker::RequestTracker;
use crate::validator::{Correlation, CorrelationValidator};

/// Submits a step's request and resolves to its correlation token
pub type IssueFn = Box<
    dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<CorrelationToken, ChainError>> + Send>>
        + Send,
>;

/// Applies a step's effect to a validated callback
pub type EffectFn = Arc<
    dyn Fn(Arc<CallbackEvent>) -> Pin<Box<dyn Future<Output = Result<StepOutcome, HandlerError>> + Send>>
        + Send
        + Sync,
>;

/// What a step effect reports after handling a matched callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step is done; the workflow may advance
    Complete,

    /// Keep the step open for further callbacks (persistent steps only)
    AwaitMore,
}

/// One request/callback round trip
pub struct WorkflowStep {
    name: String,
    category: EventCategory,
    lifetime: Lifetime,
    issue: IssueFn,
    effect: EffectFn,
}

impl WorkflowStep {
    /// A one-shot step: issue a request, run `effect` on its callback
    pub fn new<I, IFut, E, EFut>(
        name: impl Into<String>,
        category: EventCategory,
        issue: I,
        effect: E,
    ) -> Self
    where
        I: FnOnce() -> IFut + Send + 'static,
        IFut: Future<Output = Result<CorrelationToken, ChainError>> + Send + 'static,
        E: Fn(Arc<CallbackEvent>) -> EFut + Send + Sync + 'static,
        EFut: Future<Output = Result<StepOutcome, HandlerError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            category,
            lifetime: Lifetime::OneShot,
            issue: Box::new(move || Box::pin(issue())),
            effect: Arc::new(move |event| Box::pin(effect(event))),
        }
    }

    /// Keep the step subscribed until its effect returns [`StepOutcome::Complete`]
    pub fn persistent(mut self) -> Self {
        self.lifetime = Lifetime::Persistent;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The step's request could not be submitted or confirmed
    #[error("step {step} ({name}) failed to submit its request: {source}")]
    Submission {
        step: usize,
        name: String,
        source: ChainError,
    },

    /// No matching callback completed the step in time
    #[error("step {step} ({name}) timed out after {waited:?} (limit {limit:?}) awaiting callback for {token}")]
    Timeout {
        step: usize,
        name: String,
        token: CorrelationToken,
        waited: Duration,
        limit: Duration,
    },
}

impl WorkflowError {
    /// Index of the step that aborted the run
    pub fn step(&self) -> usize {
        match self {
            Self::Submission { step, .. } | Self::Timeout { step, .. } => *step,
        }
    }
}

/// Per-step entry of a [`WorkflowReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub lifetime: Lifetime,
    pub token: CorrelationToken,
    pub issued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(with = "sightflow_core::duration_millis")]
    pub waited: Duration,
    /// Callbacks on the step's category carrying a foreign token
    pub mismatched: u64,
    /// Callbacks delivered while no request was tracked
    ///
    /// The step's subscription is released only after its token is tracked,
    /// so a run driven by this runner reports 0 here. A non-zero count means
    /// something cleared the shared tracker mid-step.
    pub stale: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
}

impl WorkflowReport {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.name == name)
    }

    pub fn tokens(&self) -> Vec<&CorrelationToken> {
        self.steps.iter().map(|record| &record.token).collect()
    }

    /// Callbacks discarded by correlation across all steps
    pub fn discarded(&self) -> u64 {
        self.steps
            .iter()
            .map(|record| record.mismatched + record.stale)
            .sum()
    }
}

#[derive(Default)]
struct StepStats {
    mismatched: AtomicU64,
    stale: AtomicU64,
    completed_at: Mutex<Option<DateTime<Utc>>>,
}

/// Callback side of one step, registered with the registry
#[derive(Clone)]
struct StepCallback {
    index: usize,
    name: String,
    lifetime: Lifetime,
    validator: CorrelationValidator,
    flag: CompletionFlag,
    stats: Arc<StepStats>,
    effect: EffectFn,
}

impl StepCallback {
    async fn handle(self, event: Arc<CallbackEvent>) -> Result<Delivery, HandlerError> {
        let Self {
            index,
            name,
            lifetime,
            validator,
            flag,
            stats,
            effect,
        } = self;

        match validator.validate(&event) {
            Correlation::Match => {}
            Correlation::Mismatch { .. } => {
                stats.mismatched.fetch_add(1, Ordering::Relaxed);
                return Ok(Delivery::Ignored);
            }
            Correlation::Stale => {
                stats.stale.fetch_add(1, Ordering::Relaxed);
                return Ok(Delivery::Ignored);
            }
        }

        if flag.is_set() {
            debug!(step = index, name = %name, token = %event.token, "step already complete, ignoring callback");
            return Ok(Delivery::Ignored);
        }

        let outcome = effect(Arc::clone(&event)).await?;
        if outcome == StepOutcome::AwaitMore && lifetime == Lifetime::Persistent {
            debug!(step = index, name = %name, token = %event.token, "step awaiting further callbacks");
            return Ok(Delivery::Accepted);
        }

        *stats.completed_at.lock() = Some(Utc::now());
        flag.set();
        info!(step = index, name = %name, token = %event.token, "step effect applied");
        Ok(Delivery::Accepted)
    }
}

/// Drives [`WorkflowStep`]s one after another
///
/// The runner owns the request tracker; the registry may be shared with
/// other subscribers on the same event stream.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    registry: SubscriptionRegistry,
    tracker: Arc<RequestTracker>,
    validator: CorrelationValidator,
    barrier: SequentialBarrier,
}

impl WorkflowRunner {
    pub fn new(registry: SubscriptionRegistry, config: &FlowConfig) -> Self {
        let tracker = Arc::new(RequestTracker::new());
        Self {
            registry,
            validator: CorrelationValidator::new(Arc::clone(&tracker)),
            tracker,
            barrier: SequentialBarrier::from_config(config),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }

    pub fn barrier(&self) -> &SequentialBarrier {
        &self.barrier
    }

    /// Run `steps` in order, stopping at the first failure
    ///
    /// Subscriptions created by the run are cancelled and the tracker is
    /// cleared whether the run succeeds or aborts.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, steps = steps.len()))]
    pub async fn run(&self, steps: Vec<WorkflowStep>) -> Result<WorkflowReport, WorkflowError> {
        let run_id = Uuid::now_v7();
        Span::current().record("run_id", tracing::field::display(run_id));

        let started_at = Utc::now();
        let mut records = Vec::with_capacity(steps.len());
        info!("workflow started");

        for (index, step) in steps.into_iter().enumerate() {
            match self.run_step(index, step).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.tracker.clear();
                    error!(step = e.step(), error = %e, "workflow aborted");
                    return Err(e);
                }
            }
        }

        self.tracker.clear();
        let finished_at = Utc::now();
        info!(
            duration_ms = (finished_at - started_at).num_milliseconds(),
            "workflow finished"
        );

        Ok(WorkflowReport {
            run_id,
            started_at,
            finished_at,
            steps: records,
        })
    }

    async fn run_step(
        &self,
        index: usize,
        step: WorkflowStep,
    ) -> Result<StepRecord, WorkflowError> {
        let WorkflowStep {
            name,
            category,
            lifetime,
            issue,
            effect,
        } = step;

        info!(step = index, name = %name, %category, ?lifetime, "step started");
        // Fresh per step: a late handler of an earlier step holds its own flag
        let flag = CompletionFlag::new();
        let stats = Arc::new(StepStats::default());
        let callback = StepCallback {
            index,
            name: name.clone(),
            lifetime,
            validator: self.validator.clone(),
            flag: flag.clone(),
            stats: Arc::clone(&stats),
            effect,
        };

        // Registered before issuing so an early callback is queued, not lost
        let held = self
            .registry
            .subscribe_held(category, lifetime, move |event| callback.clone().handle(event));

        let issued_at = Utc::now();
        let token = match issue().await {
            Ok(token) => token,
            Err(source) => {
                error!(step = index, name = %name, error = %source, "request submission failed");
                return Err(WorkflowError::Submission {
                    step: index,
                    name,
                    source,
                });
            }
        };

        self.tracker.set_latest(token.clone());
        let _guard = held.release().into_guard();
        debug!(step = index, name = %name, %token, "request tracked, awaiting callback");

        let waited = self.barrier.wait(&flag).await.map_err(|e| match e {
            BarrierError::Timeout { waited, limit } => WorkflowError::Timeout {
                step: index,
                name: name.clone(),
                token: token.clone(),
                waited,
                limit,
            },
        })?;

        let completed_at = stats.completed_at.lock().unwrap_or_else(Utc::now);
        let mismatched = stats.mismatched.load(Ordering::Relaxed);
        let stale = stats.stale.load(Ordering::Relaxed);
        info!(
            step = index,
            name = %name,
            %token,
            waited_ms = waited.as_millis() as u64,
            mismatched,
            stale,
            "step completed"
        );

        Ok(StepRecord {
            index,
            name,
            lifetime,
            token,
            issued_at,
            completed_at,
            waited,
            mismatched,
            stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightflow_core::Address;

    fn config() -> FlowConfig {
        FlowConfig::new()
            .with_poll_interval(Duration::from_millis(5))
            .with_step_timeout(Duration::from_secs(5))
    }

    /// A step whose request is answered by a callback shortly after issuance
    fn answered_step(
        registry: &SubscriptionRegistry,
        category: &EventCategory,
        name: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> WorkflowStep {
        let registry = registry.clone();
        let callback_category = category.clone();
        let step_name = name.to_string();
        WorkflowStep::new(
            name,
            category.clone(),
            move || async move {
                let token = CorrelationToken::random();
                let event =
                    CallbackEvent::new(callback_category, token.clone(), serde_json::json!({}));
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    registry.publish(event);
                });
                Ok(token)
            },
            move |_event| {
                let log = Arc::clone(&log);
                let step_name = step_name.clone();
                async move {
                    log.lock().push(step_name);
                    Ok(StepOutcome::Complete)
                }
            },
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_runs_steps_in_order() {
        let registry = SubscriptionRegistry::new();
        let runner = WorkflowRunner::new(registry.clone(), &config());
        let category = EventCategory::oracle_callback(Address::random());
        let log = Arc::new(Mutex::new(Vec::new()));

        let steps = ["first", "second", "third"]
            .iter()
            .map(|name| answered_step(&registry, &category, name, Arc::clone(&log)))
            .collect();

        let report = runner.run(steps).await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
        assert_eq!(report.steps.len(), 3);
        for pair in report.steps.windows(2) {
            assert!(pair[1].issued_at >= pair[0].completed_at);
            assert_ne!(pair[0].token, pair[1].token);
        }
        assert!(!runner.tracker().is_tracking());
        assert_eq!(registry.active_count(), 0);
        assert!(report.steps.iter().all(|record| record.stale == 0));
    }

    #[test_log::test(tokio::test)]
    async fn test_late_callback_cannot_complete_next_step() {
        let runner = WorkflowRunner::new(SubscriptionRegistry::new(), &config());
        let category = EventCategory::oracle_callback(Address::random());
        let calls = Arc::new(AtomicU64::new(0));
        let effect = {
            let calls = Arc::clone(&calls);
            WorkflowStep::new(
                "counted",
                category.clone(),
                || async { Ok(CorrelationToken::random()) },
                move |_event| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(StepOutcome::Complete)
                    }
                },
            )
            .effect
        };
        let callback = |index: usize, flag: &CompletionFlag| StepCallback {
            index,
            name: format!("step-{index}"),
            lifetime: Lifetime::Persistent,
            validator: runner.validator.clone(),
            flag: flag.clone(),
            stats: Arc::new(StepStats::default()),
            effect: Arc::clone(&effect),
        };

        let token = CorrelationToken::random();
        runner.tracker().set_latest(token.clone());
        let event = Arc::new(CallbackEvent::new(category, token, serde_json::json!({})));

        let first_flag = CompletionFlag::new();
        let first = callback(0, &first_flag);
        let delivery = first.clone().handle(Arc::clone(&event)).await.unwrap();
        assert_eq!(delivery, Delivery::Accepted);
        assert!(first_flag.is_set());

        // Step 1 has started but its request is not tracked yet, so a
        // redelivery of step 0's callback still matches the tracker
        let second_flag = CompletionFlag::new();
        let _second = callback(1, &second_flag);
        let delivery = first.handle(event).await.unwrap();

        assert_eq!(delivery, Delivery::Ignored);
        assert!(!second_flag.is_set());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_submission_failure_aborts() {
        let registry = SubscriptionRegistry::new();
        let runner = WorkflowRunner::new(registry.clone(), &config());
        let category = EventCategory::oracle_callback(Address::random());
        let log = Arc::new(Mutex::new(Vec::new()));

        let steps = vec![
            answered_step(&registry, &category, "ok", Arc::clone(&log)),
            WorkflowStep::new(
                "reverts",
                category.clone(),
                || async { Err(ChainError::reverted("not the owner")) },
                |_event| async { Ok(StepOutcome::Complete) },
            ),
            answered_step(&registry, &category, "never", Arc::clone(&log)),
        ];

        let err = runner.run(steps).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Submission { step: 1, ref name, .. } if name == "reverts"
        ));
        assert_eq!(*log.lock(), vec!["ok"]);
        assert_eq!(registry.active_count(), 0);
        assert!(!runner.tracker().is_tracking());
    }

    #[test_log::test(tokio::test)]
    async fn test_timeout_when_no_callback() {
        let registry = SubscriptionRegistry::new();
        let runner = WorkflowRunner::new(
            registry.clone(),
            &config().with_step_timeout(Duration::from_millis(50)),
        );
        let category = EventCategory::oracle_callback(Address::random());
        let token = CorrelationToken::random();

        let issued = token.clone();
        let steps = vec![WorkflowStep::new(
            "silent",
            category,
            move || async move { Ok(issued) },
            |_event| async { Ok(StepOutcome::Complete) },
        )];

        match runner.run(steps).await.unwrap_err() {
            WorkflowError::Timeout {
                step,
                token: waited_on,
                limit,
                ..
            } => {
                assert_eq!(step, 0);
                assert_eq!(waited_on, token);
                assert_eq!(limit, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_report_serializes() {
        let now = Utc::now();
        let report = WorkflowReport {
            run_id: Uuid::now_v7(),
            started_at: now,
            finished_at: now,
            steps: vec![StepRecord {
                index: 0,
                name: "mint".into(),
                lifetime: Lifetime::OneShot,
                token: CorrelationToken::from_bytes(vec![0xab; 4]),
                issued_at: now,
                completed_at: now,
                waited: Duration::from_millis(1500),
                mismatched: 2,
                stale: 1,
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["token"], "0xabababab");
        assert_eq!(json["steps"][0]["waited"], 1500);
        assert_eq!(json["steps"][0]["lifetime"], "one_shot");
        assert_eq!(report.discarded(), 3);
        assert!(report.step("mint").is_some());
    }
}
