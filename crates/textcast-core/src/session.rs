//! Per-connection stream sessions.
//!
//! A session attaches to the bus, replays the retained history (or the latest
//! value when there is none), then forwards live events interleaved with
//! periodic keep-alive frames until it is terminated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{BroadcastBus, Subscription};
use crate::errors::DeliveryError;
use crate::events::BusEvent;

/// Interval between keep-alive frames.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Unique stream session identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl Default for SessionId {
    fn default() -> Self {
        Self(format!("stream_{}", Uuid::now_v7()))
    }
}

impl SessionId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Snapshotting the bus and registering the subscription.
    Attaching,
    /// Emitting the snapshot.
    Replaying,
    /// Forwarding live events and keep-alives.
    Live,
    /// Torn down. Terminal.
    Terminating,
}

/// One unit written to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A bus event (replayed or live).
    Event(BusEvent),
    /// Out-of-band liveness marker.
    KeepAlive,
}

/// Tunables for a stream session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Period between keep-alive frames.
    pub keep_alive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
        }
    }
}

/// Resources owned by one session, released together by [`Self::terminate`].
struct SessionShared {
    id: SessionId,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    subscription: Mutex<Option<Subscription>>,
    terminated: AtomicBool,
}

impl SessionShared {
    fn advance(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != SessionState::Terminating {
            *state = next;
        }
    }

    /// Stop the keep-alive loop and unsubscribe. Runs at most once.
    fn terminate(&self, reason: &'static str) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = SessionState::Terminating;
        self.cancel.cancel();
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!(session_id = %self.id, reason, "stream session terminated");
    }
}

/// Runs teardown when the stream is dropped, polled to completion or not.
struct TeardownGuard(Arc<SessionShared>);

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.0.terminate("stream dropped");
    }
}

/// Cloneable control handle for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Whether teardown has run.
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Tear the session down. Safe to call repeatedly and concurrently.
    pub fn terminate(&self) {
        self.shared.terminate("cancelled");
    }
}

/// A consumer attached to a [`BroadcastBus`].
pub struct StreamSession {
    shared: Arc<SessionShared>,
    replay: Vec<BusEvent>,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    keep_alive_interval: Duration,
}

impl StreamSession {
    /// Attach to the bus.
    ///
    /// The snapshot and the subscription are taken atomically, so the replay
    /// and the live feed neither overlap nor leave a gap. Cancelling `cancel`
    /// (or any parent it was derived from) ends the session.
    pub fn open(bus: &BroadcastBus, config: &SessionConfig, cancel: CancellationToken) -> Self {
        let shared = Arc::new(SessionShared {
            id: SessionId::new(),
            state: Mutex::new(SessionState::Attaching),
            cancel,
            subscription: Mutex::new(None),
            terminated: AtomicBool::new(false),
        });

        // Unbounded: a publish burst between polls is buffered, never dropped.
        let (tx, rx) = mpsc::unbounded_channel();
        let weak: Weak<SessionShared> = Arc::downgrade(&shared);
        let (snapshot, subscription) = bus.attach(move |event: &BusEvent| {
            if tx.send(event.clone()).is_ok() {
                return Ok(());
            }
            if let Some(shared) = weak.upgrade() {
                shared.terminate("delivery failed");
            }
            Err(DeliveryError::Closed)
        });

        {
            let mut slot = shared.subscription.lock();
            if shared.terminated.load(Ordering::SeqCst) {
                drop(slot);
                subscription.unsubscribe();
            } else {
                *slot = Some(subscription);
            }
        }

        let replay = snapshot.replay();
        shared.advance(SessionState::Replaying);
        info!(
            session_id = %shared.id,
            replay_len = replay.len(),
            "stream session attached"
        );

        Self {
            shared,
            replay,
            rx,
            keep_alive_interval: config.keep_alive_interval.max(Duration::from_millis(1)),
        }
    }

    /// Control handle for this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// Turn the session into the frame stream written to the consumer.
    ///
    /// Dropping the stream tears the session down.
    pub fn into_stream(self) -> impl Stream<Item = Frame> + Send + 'static {
        let Self {
            shared,
            replay,
            mut rx,
            keep_alive_interval,
        } = self;
        let guard = TeardownGuard(Arc::clone(&shared));

        async_stream::stream! {
            let _guard = guard;

            for event in replay {
                if shared.cancel.is_cancelled() {
                    return;
                }
                yield Frame::Event(event);
            }
            shared.advance(SessionState::Live);
            debug!(session_id = %shared.id, "stream session live");

            let mut keep_alive = tokio::time::interval_at(
                Instant::now() + keep_alive_interval,
                keep_alive_interval,
            );
            keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let frame = tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => None,
                    event = rx.recv() => event.map(Frame::Event),
                    _ = keep_alive.tick() => Some(Frame::KeepAlive),
                };
                match frame {
                    Some(frame) => yield frame,
                    None => break,
                }
            }
        }
    }
}
