//! Subscription registry and per-subscription delivery tasks
//!
//! Every subscription owns an unbounded FIFO and a delivery task. Publishing
//! an event only enqueues it, so a slow or failing handler never delays or
//! breaks delivery to other subscriptions, while events for one subscription
//! are handled one at a time in emission order.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::RwLock;
use sightflow_core::{CallbackEvent, EventCategory};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use super::{CallbackHandler, Delivery, HandlerResult, Lifetime};

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Entry {
    category: EventCategory,
    sender: mpsc::UnboundedSender<Arc<CallbackEvent>>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct RegistryInner {
    subscriptions: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl RegistryInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        match self.subscriptions.write().remove(&id) {
            Some(entry) => {
                entry.cancelled.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }
}

/// Routes callback events to registered subscriptions
///
/// Cloning is cheap; clones share the same set of subscriptions. Subscribing
/// spawns a tokio task, so it must happen inside a runtime.
///
/// # Example
///
/// ```ignore
/// use sightflow_workflow::prelude::*;
///
/// let registry = SubscriptionRegistry::new();
/// registry.attach(chain.subscribe_events());
///
/// let handle = registry.subscribe(
///     EventCategory::oracle_callback(contract),
///     Lifetime::Persistent,
///     |event| async move {
///         tracing::info!(token = %event.token, "oracle answered");
///         Ok(Delivery::Accepted)
///     },
/// );
///
/// // ... later
/// registry.unsubscribe(&handle);
/// ```
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `category`, active immediately
    pub fn subscribe<F, Fut>(
        &self,
        category: EventCategory,
        lifetime: Lifetime,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Arc<CallbackEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: CallbackHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.register(category, lifetime, handler, None)
    }

    /// Register a handler whose deliveries wait for [`HeldSubscription::release`]
    ///
    /// Events published in the meantime are queued, not dropped. Dropping the
    /// held subscription without releasing it cancels it.
    pub fn subscribe_held<F, Fut>(
        &self,
        category: EventCategory,
        lifetime: Lifetime,
        handler: F,
    ) -> HeldSubscription
    where
        F: Fn(Arc<CallbackEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: CallbackHandler = Arc::new(move |event| Box::pin(handler(event)));
        let (gate_tx, gate_rx) = oneshot::channel();
        let handle = self.register(category, lifetime, handler, Some(gate_rx));
        HeldSubscription {
            handle,
            gate: Some(gate_tx),
        }
    }

    fn register(
        &self,
        category: EventCategory,
        lifetime: Lifetime,
        handler: CallbackHandler,
        gate: Option<oneshot::Receiver<()>>,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(Uuid::now_v7());
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let held = gate.is_some();

        self.inner.subscriptions.write().insert(
            id,
            Entry {
                category: category.clone(),
                sender,
                cancelled: Arc::clone(&cancelled),
            },
        );

        tokio::spawn(deliver(
            Arc::downgrade(&self.inner),
            id,
            category.clone(),
            lifetime,
            handler,
            receiver,
            cancelled,
            gate,
        ));

        debug!(subscription = %id, %category, ?lifetime, held, "subscribed");

        SubscriptionHandle {
            id,
            category,
            lifetime,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Route an event to every active subscription on its category
    ///
    /// Returns the number of subscriptions the event was queued for.
    pub fn publish(&self, event: CallbackEvent) -> usize {
        let event = Arc::new(event);
        let subscriptions = self.inner.subscriptions.read();
        let mut routed = 0;

        for (id, entry) in subscriptions.iter() {
            if entry.category != event.category || entry.cancelled.load(Ordering::Acquire) {
                continue;
            }
            if entry.sender.send(Arc::clone(&event)).is_ok() {
                routed += 1;
            } else {
                trace!(subscription = %id, "delivery task gone, skipping");
            }
        }

        if routed == 0 {
            debug!(
                category = %event.category,
                token = %event.token,
                "no subscription for callback"
            );
        } else {
            trace!(category = %event.category, token = %event.token, routed, "callback routed");
        }

        routed
    }

    /// Pump a chain event stream into this registry
    ///
    /// The pump stops when the stream closes or the registry is dropped.
    pub fn attach(&self, mut events: broadcast::Receiver<CallbackEvent>) -> JoinHandle<()> {
        let registry = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = registry.upgrade() else {
                            break;
                        };
                        SubscriptionRegistry { inner }.publish(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event stream lagged, callbacks were dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("event stream closed");
                        break;
                    }
                }
            }
        })
    }

    /// Cancel a subscription; returns false if it was no longer active
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.remove(handle.id);
        if removed {
            debug!(subscription = %handle.id, category = %handle.category, "unsubscribed");
        }
        removed
    }

    /// Cancel every subscription, returning how many were active
    pub fn unsubscribe_all(&self) -> usize {
        let drained: Vec<_> = self.inner.subscriptions.write().drain().collect();
        for (_, entry) in &drained {
            entry.cancelled.store(true, Ordering::Release);
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "unsubscribed all");
        }
        drained.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    pub fn is_active(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.contains(handle.id)
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("active", &self.active_count())
            .finish()
    }
}

/// Reference to a registered subscription
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    category: EventCategory,
    lifetime: Lifetime,
    registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.contains(self.id))
    }

    /// Cancel the subscription; returns false if it was no longer active
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => SubscriptionRegistry { inner }.unsubscribe(self),
            None => false,
        }
    }

    /// Tie the subscription's lifetime to the returned guard
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Unsubscribes when dropped
#[derive(Debug)]
pub struct SubscriptionGuard(SubscriptionHandle);

impl SubscriptionGuard {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.0
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// A subscription that queues events until released
#[derive(Debug)]
pub struct HeldSubscription {
    handle: SubscriptionHandle,
    gate: Option<oneshot::Sender<()>>,
}

impl HeldSubscription {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Start handing queued and future events to the handler
    pub fn release(mut self) -> SubscriptionHandle {
        if let Some(gate) = self.gate.take() {
            // The delivery task only goes away once unsubscribed
            let _ = gate.send(());
            debug!(subscription = %self.handle.id, "subscription released");
        }
        self.handle.clone()
    }
}

impl Drop for HeldSubscription {
    fn drop(&mut self) {
        if self.gate.take().is_some() {
            self.handle.unsubscribe();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn deliver(
    registry: Weak<RegistryInner>,
    id: SubscriptionId,
    category: EventCategory,
    lifetime: Lifetime,
    handler: CallbackHandler,
    mut events: mpsc::UnboundedReceiver<Arc<CallbackEvent>>,
    cancelled: Arc<AtomicBool>,
    gate: Option<oneshot::Receiver<()>>,
) {
    if let Some(gate) = gate {
        if gate.await.is_err() {
            debug!(subscription = %id, "held subscription dropped before release");
            if let Some(inner) = registry.upgrade() {
                inner.remove(id);
            }
            return;
        }
    }

    while let Some(event) = events.recv().await {
        if cancelled.load(Ordering::Acquire) {
            break;
        }

        let outcome = AssertUnwindSafe(async { handler(Arc::clone(&event)).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Delivery::Accepted)) => {
                debug!(subscription = %id, %category, token = %event.token, "callback delivered");
                if lifetime == Lifetime::OneShot {
                    cancelled.store(true, Ordering::Release);
                    if let Some(inner) = registry.upgrade() {
                        inner.remove(id);
                    }
                    break;
                }
            }
            Ok(Ok(Delivery::Ignored)) => {
                trace!(subscription = %id, %category, token = %event.token, "callback ignored");
            }
            Ok(Err(e)) => {
                error!(
                    subscription = %id,
                    %category,
                    token = %event.token,
                    error = %e,
                    "callback handler failed"
                );
            }
            Err(panic) => {
                error!(
                    subscription = %id,
                    %category,
                    token = %event.token,
                    panic = %panic_message(panic.as_ref()),
                    "callback handler panicked"
                );
            }
        }
    }

    trace!(subscription = %id, "delivery task finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightflow_core::{Address, CorrelationToken};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::subscription::HandlerError;

    fn category() -> EventCategory {
        EventCategory::oracle_callback(Address::random())
    }

    fn event(category: &EventCategory) -> CallbackEvent {
        CallbackEvent::new(
            category.clone(),
            CorrelationToken::random(),
            serde_json::json!({}),
        )
    }

    fn counting(
        counter: &Arc<AtomicUsize>,
        verdict: Delivery,
    ) -> impl Fn(Arc<CallbackEvent>) -> futures::future::Ready<HandlerResult> + Send + Sync + 'static
    {
        let counter = Arc::clone(counter);
        move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(verdict))
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_one_shot_delivers_once() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = registry.subscribe(
            category.clone(),
            Lifetime::OneShot,
            counting(&calls, Delivery::Accepted),
        );

        let redelivered = event(&category);
        registry.publish(redelivered.clone());
        registry.publish(redelivered);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
        assert_eq!(registry.publish(event(&category)), 0);
    }

    #[tokio::test]
    async fn test_one_shot_stays_active_while_ignoring() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = registry.subscribe(
            category.clone(),
            Lifetime::OneShot,
            counting(&calls, Delivery::Ignored),
        );

        registry.publish(event(&category));
        registry.publish(event(&category));
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_persistent_until_unsubscribed() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = registry.subscribe(
            category.clone(),
            Lifetime::Persistent,
            counting(&calls, Delivery::Accepted),
        );

        registry.publish(event(&category));
        registry.publish(event(&category));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(registry.unsubscribe(&handle));
        assert!(!registry.unsubscribe(&handle));
        registry.publish(event(&category));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routes_by_category() {
        let registry = SubscriptionRegistry::new();
        let watched = category();
        let other = category();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.subscribe(
            watched.clone(),
            Lifetime::Persistent,
            counting(&calls, Delivery::Accepted),
        );

        assert_eq!(registry.publish(event(&other)), 0);
        assert_eq!(registry.publish(event(&watched)), 1);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preserves_emission_order() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        registry.subscribe(category.clone(), Lifetime::Persistent, move |event| {
            let sink = Arc::clone(&sink);
            async move {
                // Yield so a concurrent delivery would interleave if one existed
                tokio::task::yield_now().await;
                sink.lock().push(event.token.clone());
                Ok(Delivery::Accepted)
            }
        });

        let events: Vec<_> = (0..20).map(|_| event(&category)).collect();
        for e in &events {
            registry.publish(e.clone());
        }
        settle().await;

        let expected: Vec<_> = events.iter().map(|e| e.token.clone()).collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[tokio::test]
    async fn test_handler_faults_are_isolated() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.subscribe(category.clone(), Lifetime::Persistent, |_event| async {
            Err::<Delivery, _>(HandlerError::failed("boom"))
        });
        registry.subscribe(
            category.clone(),
            Lifetime::Persistent,
            |_event| -> futures::future::Ready<HandlerResult> { panic!("handler exploded") },
        );
        registry.subscribe(
            category.clone(),
            Lifetime::Persistent,
            counting(&calls, Delivery::Accepted),
        );

        assert_eq!(registry.publish(event(&category)), 3);
        assert_eq!(registry.publish(event(&category)), 3);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.active_count(), 3);
    }

    #[tokio::test]
    async fn test_held_subscription_buffers_until_release() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        let held = registry.subscribe_held(
            category.clone(),
            Lifetime::OneShot,
            counting(&calls, Delivery::Accepted),
        );

        registry.publish(event(&category));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let handle = held.release();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_dropping_held_subscription_cancels_it() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));

        let held = registry.subscribe_held(
            category.clone(),
            Lifetime::Persistent,
            counting(&calls, Delivery::Accepted),
        );
        let handle = held.handle().clone();
        registry.publish(event(&category));
        drop(held);
        settle().await;

        assert!(!handle.is_active());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_guard_and_unsubscribe_all() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let guarded = registry
            .subscribe(
                category(),
                Lifetime::Persistent,
                counting(&calls, Delivery::Accepted),
            )
            .into_guard();
        assert!(guarded.handle().is_active());
        drop(guarded);
        assert_eq!(registry.active_count(), 0);

        for _ in 0..3 {
            registry.subscribe(
                category(),
                Lifetime::Persistent,
                counting(&calls, Delivery::Accepted),
            );
        }
        assert_eq!(registry.unsubscribe_all(), 3);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_pumps_broadcast_stream() {
        let registry = SubscriptionRegistry::new();
        let category = category();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.subscribe(
            category.clone(),
            Lifetime::Persistent,
            counting(&calls, Delivery::Accepted),
        );

        let (tx, rx) = broadcast::channel(16);
        let pump = registry.attach(rx);
        tx.send(event(&category)).unwrap();
        tx.send(event(&category)).unwrap();
        drop(tx);

        pump.await.unwrap();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
