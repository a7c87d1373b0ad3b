//! Integration tests for request/callback correlation in WorkflowRunner
//!
//! Run with: cargo test -p sightflow-workflow --test correlation_test
//!
//! The oracle is played by the tests themselves: each step's issue closure
//! publishes whatever callbacks the scenario needs into the registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sightflow_core::{Address, ChainError};
use sightflow_workflow::prelude::*;
use tokio::sync::broadcast;

fn fast_config() -> FlowConfig {
    FlowConfig::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_step_timeout(Duration::from_secs(5))
}

fn callback(category: &EventCategory, token: &CorrelationToken) -> CallbackEvent {
    CallbackEvent::new(category.clone(), token.clone(), json!({ "ok": true }))
}

/// Effect that counts its invocations and completes the step
fn counting_effect(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(Arc<CallbackEvent>) -> std::future::Ready<Result<StepOutcome, HandlerError>>
       + Send
       + Sync
       + 'static {
    let counter = Arc::clone(counter);
    move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(StepOutcome::Complete))
    }
}

// ============================================
// Delivery timing
// ============================================

#[test_log::test(tokio::test)]
async fn test_callback_before_confirmation_is_not_lost() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let effects = Arc::new(AtomicUsize::new(0));

    let oracle = registry.clone();
    let emitted = category.clone();
    let step = WorkflowStep::new(
        "instant",
        category,
        move || async move {
            // The oracle answers before the issuer even learns the token
            let token = CorrelationToken::random();
            oracle.publish(callback(&emitted, &token));
            Ok(token)
        },
        counting_effect(&effects),
    );

    let report = runner.run(vec![step]).await.unwrap();
    assert_eq!(effects.load(Ordering::SeqCst), 1);
    assert_eq!(report.steps[0].mismatched, 0);
}

#[test_log::test(tokio::test)]
async fn test_runner_driven_by_broadcast_stream() {
    let registry = SubscriptionRegistry::new();
    let (events, rx) = broadcast::channel(16);
    registry.attach(rx);

    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let effects = Arc::new(AtomicUsize::new(0));

    let steps = (0..3)
        .map(|i| {
            let events = events.clone();
            let emitted = category.clone();
            WorkflowStep::new(
                format!("step-{i}"),
                category.clone(),
                move || async move {
                    let token = CorrelationToken::random();
                    let event = callback(&emitted, &token);
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        let _ = events.send(event);
                    });
                    Ok(token)
                },
                counting_effect(&effects),
            )
        })
        .collect();

    let report = runner.run(steps).await.unwrap();
    assert_eq!(effects.load(Ordering::SeqCst), 3);
    for pair in report.steps.windows(2) {
        assert!(pair[1].issued_at >= pair[0].completed_at);
    }
}

// ============================================
// Correlation guards
// ============================================

#[test_log::test(tokio::test)]
async fn test_foreign_tokens_are_counted_and_ignored() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let effects = Arc::new(AtomicUsize::new(0));

    let oracle = registry.clone();
    let emitted = category.clone();
    let step = WorkflowStep::new(
        "noisy",
        category,
        move || async move {
            let token = CorrelationToken::random();
            oracle.publish(callback(&emitted, &CorrelationToken::random()));
            oracle.publish(callback(&emitted, &CorrelationToken::random()));
            oracle.publish(callback(&emitted, &token));
            Ok(token)
        },
        counting_effect(&effects),
    );

    let report = runner.run(vec![step]).await.unwrap();
    assert_eq!(effects.load(Ordering::SeqCst), 1);
    assert_eq!(report.steps[0].mismatched, 2);
    assert_eq!(report.steps[0].stale, 0);
}

#[test_log::test(tokio::test)]
async fn test_redelivery_runs_effect_at_most_once() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let effects = Arc::new(AtomicUsize::new(0));

    let oracle = registry.clone();
    let emitted = category.clone();
    let step = WorkflowStep::new(
        "duplicated",
        category,
        move || async move {
            let token = CorrelationToken::random();
            let event = callback(&emitted, &token);
            for _ in 0..3 {
                oracle.publish(event.clone());
            }
            Ok(token)
        },
        counting_effect(&effects),
    );

    runner.run(vec![step]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(effects.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn test_late_callback_from_previous_step_is_mismatch() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let first_effects = Arc::new(AtomicUsize::new(0));
    let second_effects = Arc::new(AtomicUsize::new(0));
    let first_token = CorrelationToken::random();

    let oracle = registry.clone();
    let emitted = category.clone();
    let issued = first_token.clone();
    let first = WorkflowStep::new(
        "first",
        category.clone(),
        move || async move {
            oracle.publish(callback(&emitted, &issued));
            Ok(issued)
        },
        counting_effect(&first_effects),
    );

    let oracle = registry.clone();
    let emitted = category.clone();
    let late = first_token.clone();
    let second = WorkflowStep::new(
        "second",
        category,
        move || async move {
            let token = CorrelationToken::random();
            // A straggler redelivery of the first step's callback
            oracle.publish(callback(&emitted, &late));
            oracle.publish(callback(&emitted, &token));
            Ok(token)
        },
        counting_effect(&second_effects),
    );

    let report = runner.run(vec![first, second]).await.unwrap();
    assert_eq!(first_effects.load(Ordering::SeqCst), 1);
    assert_eq!(second_effects.load(Ordering::SeqCst), 1);
    assert_eq!(report.steps[0].token, first_token);
    assert_eq!(report.steps[1].mismatched, 1);
}

#[test_log::test(tokio::test)]
async fn test_stale_before_any_request() {
    let registry = SubscriptionRegistry::new();
    let tracker = Arc::new(RequestTracker::new());
    let validator = CorrelationValidator::new(Arc::clone(&tracker));
    let category = EventCategory::oracle_callback(Address::random());
    let verdicts = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink = Arc::clone(&verdicts);
    registry.subscribe(category.clone(), Lifetime::Persistent, move |event| {
        let verdict = validator.validate(&event);
        sink.lock().push(verdict);
        async { Ok(Delivery::Ignored) }
    });

    registry.publish(callback(&category, &CorrelationToken::random()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*verdicts.lock(), vec![Correlation::Stale]);
    assert!(!tracker.is_tracking());
}

#[test]
fn test_validate_matches_iff_token_is_current() {
    let tracker = Arc::new(RequestTracker::new());
    let validator = CorrelationValidator::new(Arc::clone(&tracker));
    let category = EventCategory::oracle_callback(Address::random());
    let tokens: Vec<_> = (0..16).map(|_| CorrelationToken::random()).collect();

    for (i, current) in tokens.iter().enumerate() {
        tracker.set_latest(current.clone());
        for (j, candidate) in tokens.iter().enumerate() {
            let verdict = validator.validate(&callback(&category, candidate));
            assert_eq!(verdict.is_match(), i == j, "tracked {i}, delivered {j}");
        }
    }
}

// ============================================
// Persistent steps and failures
// ============================================

#[test_log::test(tokio::test)]
async fn test_persistent_step_collects_until_complete() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());
    let seen = Arc::new(AtomicUsize::new(0));

    let oracle = registry.clone();
    let emitted = category.clone();
    let counter = Arc::clone(&seen);
    let step = WorkflowStep::new(
        "collect",
        category,
        move || async move {
            let token = CorrelationToken::random();
            for _ in 0..3 {
                oracle.publish(callback(&emitted, &token));
            }
            Ok(token)
        },
        move |_event| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Ok(if n < 3 {
                    StepOutcome::AwaitMore
                } else {
                    StepOutcome::Complete
                })
            }
        },
    )
    .persistent();

    let report = runner.run(vec![step]).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(report.steps[0].lifetime, Lifetime::Persistent);
    assert_eq!(registry.active_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_handler_fault_surfaces_as_timeout() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(
        registry.clone(),
        &fast_config().with_step_timeout(Duration::from_millis(100)),
    );
    let category = EventCategory::oracle_callback(Address::random());

    let oracle = registry.clone();
    let emitted = category.clone();
    let step = WorkflowStep::new(
        "faulty",
        category,
        move || async move {
            let token = CorrelationToken::random();
            oracle.publish(callback(&emitted, &token));
            Ok(token)
        },
        |_event| async { Err(HandlerError::failed("decryption result malformed")) },
    );

    let err = runner.run(vec![step]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout { step: 0, .. }));
    assert_eq!(registry.active_count(), 0);
    assert!(!runner.tracker().is_tracking());
}

#[test_log::test(tokio::test)]
async fn test_submission_fault_cancels_held_subscription() {
    let registry = SubscriptionRegistry::new();
    let runner = WorkflowRunner::new(registry.clone(), &fast_config());
    let category = EventCategory::oracle_callback(Address::random());

    let step = WorkflowStep::new(
        "unreachable",
        category,
        || async { Err(ChainError::Transport("connection refused".into())) },
        |_event| async { Ok(StepOutcome::Complete) },
    );

    let err = runner.run(vec![step]).await.unwrap_err();
    match err {
        WorkflowError::Submission { step, source, .. } => {
            assert_eq!(step, 0);
            assert_eq!(source, ChainError::Transport("connection refused".into()));
        }
        other => panic!("expected submission error, got {other:?}"),
    }
    assert_eq!(registry.active_count(), 0);
}
