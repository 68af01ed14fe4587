//! Events pushed to subscribers.

use serde::{Deserialize, Serialize};

/// A full replacement of the current text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    /// The new text.
    pub text: String,
}

impl TextEvent {
    /// Create a text event.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Signal that something changed and listeners should re-fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEvent {
    /// Epoch milliseconds at which the refresh was triggered.
    pub timestamp: i64,
}

impl RefreshEvent {
    /// Create a refresh event stamped with the current time.
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One unit of information delivered through the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    /// Text replacement.
    #[serde(rename = "text")]
    Text(TextEvent),
    /// Refresh signal.
    #[serde(rename = "refresh")]
    Refresh(RefreshEvent),
}

impl BusEvent {
    /// Short type name used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Refresh(_) => "refresh",
        }
    }

    /// The text payload, if this is a text event.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(event) => Some(&event.text),
            Self::Refresh(_) => None,
        }
    }
}

impl From<TextEvent> for BusEvent {
    fn from(event: TextEvent) -> Self {
        Self::Text(event)
    }
}

impl From<RefreshEvent> for BusEvent {
    fn from(event: RefreshEvent) -> Self {
        Self::Refresh(event)
    }
}
