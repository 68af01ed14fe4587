//! Shared text state with bounded history and subscriber fan-out.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::DeliveryError;
use crate::events::{BusEvent, RefreshEvent, TextEvent};

/// Callback invoked once per delivered event.
pub type Handler = Arc<dyn Fn(&BusEvent) -> Result<(), DeliveryError> + Send + Sync>;

struct BusState {
    latest: TextEvent,
    history: VecDeque<TextEvent>,
    subscribers: HashMap<u64, Handler>,
}

struct BusInner {
    state: Mutex<BusState>,
    history_limit: NonZeroUsize,
    next_subscriber_id: AtomicU64,
}

/// Point-in-time copy of the bus contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Most recently published text.
    pub latest: TextEvent,
    /// Retained history, oldest first.
    pub history: Vec<TextEvent>,
}

impl Snapshot {
    /// Events a newly attached consumer should see first.
    ///
    /// The history in order, or just `latest` when history is empty, so a
    /// fresh bus still yields one event.
    pub fn replay(&self) -> Vec<BusEvent> {
        if self.history.is_empty() {
            vec![BusEvent::Text(self.latest.clone())]
        } else {
            self.history.iter().cloned().map(BusEvent::Text).collect()
        }
    }
}

/// In-memory broadcast bus.
///
/// Cheap to clone; all clones share the same state. State mutations and
/// subscriber changes are serialized through one lock. Delivery happens on a
/// snapshot of the subscriber set after the lock is released.
#[derive(Clone)]
pub struct BroadcastBus {
    inner: Arc<BusInner>,
}

impl BroadcastBus {
    /// Create a bus retaining at most `history_limit` text events.
    pub fn new(history_limit: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    latest: TextEvent::default(),
                    history: VecDeque::new(),
                    subscribers: HashMap::new(),
                }),
                history_limit,
                next_subscriber_id: AtomicU64::new(1),
            }),
        }
    }

    /// Maximum number of retained text events.
    pub fn history_limit(&self) -> usize {
        self.inner.history_limit.get()
    }

    /// The most recently published text event.
    pub fn latest(&self) -> TextEvent {
        self.inner.state.lock().latest.clone()
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<TextEvent> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    /// Latest value and history taken under a single lock.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        Snapshot {
            latest: state.latest.clone(),
            history: state.history.iter().cloned().collect(),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Replace the current text and fan the new event out to all subscribers.
    pub fn publish_text(&self, text: impl Into<String>) {
        let event = TextEvent::new(text);
        let recipients = {
            let mut state = self.inner.state.lock();
            state.latest = event.clone();
            state.history.push_back(event.clone());
            while state.history.len() > self.inner.history_limit.get() {
                let _ = state.history.pop_front();
            }
            debug!(
                text_len = event.text.len(),
                history_len = state.history.len(),
                subscribers = state.subscribers.len(),
                "published text"
            );
            Self::recipients(&state)
        };
        Self::deliver(&BusEvent::Text(event), recipients);
    }

    /// Signal all subscribers to re-fetch. Leaves latest and history untouched.
    pub fn trigger_refresh(&self) {
        let event = RefreshEvent::now();
        let recipients = {
            let state = self.inner.state.lock();
            debug!(
                timestamp = event.timestamp,
                subscribers = state.subscribers.len(),
                "triggered refresh"
            );
            Self::recipients(&state)
        };
        Self::deliver(&BusEvent::Refresh(event), recipients);
    }

    /// Register a handler for future events. No backlog is delivered.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        self.register(&mut state, Arc::new(handler))
    }

    /// Snapshot the bus and register a handler in one critical section.
    ///
    /// Every event published after the snapshot reaches the handler, and no
    /// event in the snapshot is delivered to it again.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn attach<F>(&self, handler: F) -> (Snapshot, Subscription)
    where
        F: Fn(&BusEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        let snapshot = Snapshot {
            latest: state.latest.clone(),
            history: state.history.iter().cloned().collect(),
        };
        let subscription = self.register(&mut state, Arc::new(handler));
        (snapshot, subscription)
    }

    fn register(&self, state: &mut BusState, handler: Handler) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let _ = state.subscribers.insert(id, handler);
        debug!(subscriber_id = id, subscribers = state.subscribers.len(), "subscribed");
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    fn recipients(state: &BusState) -> Vec<(u64, Handler)> {
        state
            .subscribers
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect()
    }

    fn deliver(event: &BusEvent, recipients: Vec<(u64, Handler)>) {
        for (id, handler) in recipients {
            if let Err(e) = handler(event) {
                warn!(
                    subscriber_id = id,
                    event_type = event.event_type(),
                    kind = e.error_kind(),
                    error = %e,
                    "failed to deliver event to subscriber"
                );
            }
        }
    }
}

/// Registration handle returned by [`BroadcastBus::subscribe`].
///
/// Unsubscribes when dropped. Unsubscribing more than once is a no-op.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Identifier of this subscription within its bus.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler from the bus.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if state.subscribers.remove(&self.id).is_some() {
            debug!(
                subscriber_id = self.id,
                subscribers = state.subscribers.len(),
                "unsubscribed"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(limit: usize) -> BroadcastBus {
        BroadcastBus::new(NonZeroUsize::new(limit).unwrap())
    }

    fn recorder() -> (Arc<Mutex<Vec<BusEvent>>>, impl Fn(&BusEvent) -> Result<(), DeliveryError>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &BusEvent| {
            sink.lock().push(event.clone());
            Ok(())
        })
    }

    fn texts(events: &[TextEvent]) -> Vec<&str> {
        events.iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn fresh_bus_has_empty_latest_and_history() {
        let bus = bus(3);
        assert_eq!(bus.latest(), TextEvent::default());
        assert!(bus.history().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn history_evicts_oldest_past_limit() {
        let bus = bus(3);
        for text in ["a", "b", "c", "d"] {
            bus.publish_text(text);
        }
        assert_eq!(texts(&bus.history()), ["b", "c", "d"]);
        assert_eq!(bus.latest().text, "d");
    }

    #[test]
    fn huge_limit_does_not_preallocate() {
        let bus = bus(usize::MAX);
        assert_eq!(bus.history_limit(), usize::MAX);
        bus.publish_text("a");
        bus.publish_text("b");
        assert_eq!(texts(&bus.history()), ["a", "b"]);
    }

    #[test]
    fn history_is_a_copy() {
        let bus = bus(3);
        bus.publish_text("a");
        let mut history = bus.history();
        history.clear();
        assert_eq!(bus.history().len(), 1);
    }

    #[test]
    fn publish_delivers_to_every_subscriber_once() {
        let bus = bus(3);
        let (seen1, h1) = recorder();
        let (seen2, h2) = recorder();
        let _s1 = bus.subscribe(h1);
        let _s2 = bus.subscribe(h2);

        bus.publish_text("x");

        for seen in [seen1, seen2] {
            let seen = seen.lock();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].as_text(), Some("x"));
        }
    }

    #[test]
    fn subscribe_does_not_replay_backlog() {
        let bus = bus(3);
        bus.publish_text("old");
        let (seen, handler) = recorder();
        let _sub = bus.subscribe(handler);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = bus(3);
        let (seen, handler) = recorder();
        let sub = bus.subscribe(handler);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish_text("late");
        bus.trigger_refresh();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = bus(3);
        let (_seen, h1) = recorder();
        let (seen2, h2) = recorder();
        let sub1 = bus.subscribe(h1);
        let _sub2 = bus.subscribe(h2);

        sub1.unsubscribe();
        sub1.unsubscribe();
        drop(sub1);

        assert_eq!(bus.subscriber_count(), 1);
        bus.publish_text("still here");
        assert_eq!(seen2.lock().len(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = bus(3);
        let (_seen, handler) = recorder();
        {
            let _sub = bus.subscribe(handler);
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = bus(3);
        let (_seen, handler) = recorder();
        let sub = bus.subscribe(handler);
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let bus = bus(3);
        let _broken = bus.subscribe(|_: &BusEvent| Err(DeliveryError::Closed));
        let (seen, handler) = recorder();
        let _ok = bus.subscribe(handler);

        bus.publish_text("x");
        bus.trigger_refresh();

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(bus.latest().text, "x");
    }

    #[test]
    fn refresh_reaches_subscribers_without_touching_state() {
        let bus = bus(3);
        bus.publish_text("a");
        let (seen, handler) = recorder();
        let _sub = bus.subscribe(handler);

        bus.trigger_refresh();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], BusEvent::Refresh(_)));
        assert_eq!(texts(&bus.history()), ["a"]);
        assert_eq!(bus.latest().text, "a");
    }

    #[test]
    fn handler_may_unsubscribe_during_delivery() {
        let bus = bus(3);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_slot = Arc::clone(&slot);
        let sub = bus.subscribe(move |_: &BusEvent| {
            if let Some(sub) = inner_slot.lock().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        *slot.lock() = Some(sub);

        bus.publish_text("x");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn attach_snapshots_and_subscribes_together() {
        let bus = bus(3);
        bus.publish_text("a");
        bus.publish_text("b");
        let (seen, handler) = recorder();

        let (snapshot, _sub) = bus.attach(handler);
        assert_eq!(texts(&snapshot.history), ["a", "b"]);
        assert_eq!(snapshot.latest.text, "b");

        bus.publish_text("c");
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_text(), Some("c"));
    }

    #[test]
    fn replay_falls_back_to_latest_on_empty_history() {
        let bus = bus(3);
        let replay = bus.snapshot().replay();
        assert_eq!(replay, vec![BusEvent::Text(TextEvent::default())]);
    }

    #[test]
    fn replay_uses_history_in_order() {
        let bus = bus(3);
        for text in ["a", "b", "c", "d"] {
            bus.publish_text(text);
        }
        let replay: Vec<_> = bus
            .snapshot()
            .replay()
            .iter()
            .filter_map(|e| e.as_text().map(str::to_owned))
            .collect();
        assert_eq!(replay, ["b", "c", "d"]);
    }

    #[test]
    fn concurrent_publishers_keep_history_bounded() {
        let bus = bus(5);
        let (seen, handler) = recorder();
        let _sub = bus.subscribe(handler);

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        bus.publish_text(format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(bus.history().len(), 5);
        assert_eq!(seen.lock().len(), 200);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn history_is_last_n_published(
                limit in 1usize..8,
                texts in proptest::collection::vec(".{0,6}", 0..30),
            ) {
                let bus = bus(limit);
                for text in &texts {
                    bus.publish_text(text.clone());
                }

                let history: Vec<String> = bus.history().into_iter().map(|e| e.text).collect();
                let keep = texts.len().min(limit);
                prop_assert!(history.len() <= limit);
                prop_assert_eq!(&history[..], &texts[texts.len() - keep..]);
            }

            #[test]
            fn latest_tracks_last_publish(
                limit in 1usize..4,
                texts in proptest::collection::vec(".{0,6}", 1..20),
            ) {
                let bus = bus(limit);
                for text in &texts {
                    bus.publish_text(text.clone());
                    prop_assert_eq!(&bus.latest().text, text);
                }
            }
        }
    }
}
