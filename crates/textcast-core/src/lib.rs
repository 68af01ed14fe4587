//! # textcast-core
//!
//! In-memory text distribution primitives.
//!
//! - [`BroadcastBus`]: latest value, bounded history, subscriber fan-out
//! - [`StreamSession`]: per-connection replay, live forwarding, keep-alive
//! - [`wire`]: `text/event-stream` framing for events and keep-alives

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod events;
pub mod session;
pub mod wire;

pub use bus::{BroadcastBus, Subscription};
pub use errors::DeliveryError;
pub use events::{BusEvent, RefreshEvent, TextEvent};
pub use session::{Frame, SessionConfig, SessionHandle, SessionId, SessionState, StreamSession};
pub use wire::Framing;
