//! `text/event-stream` framing.
//!
//! Every event is written as `data: <payload>\n\n`; keep-alives are the
//! comment block `: keep-alive\n\n`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::events::BusEvent;
use crate::session::Frame;

/// Keep-alive comment block.
pub const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

/// Payload encoding for text events. Applies to replay and live delivery alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// `{"type":"text","text":"..."}`.
    #[default]
    Json,
    /// The raw text, for consumers predating tagged events.
    Legacy,
}

impl Framing {
    /// Lowercase name, as used in settings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Legacy => "legacy",
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown framing: {other}")),
        }
    }
}

/// Payload string for an event under `framing`.
///
/// Refresh events are always JSON; only text events have a legacy form.
pub fn payload(event: &BusEvent, framing: Framing) -> Result<String, serde_json::Error> {
    match (event, framing) {
        (BusEvent::Text(text), Framing::Legacy) => Ok(text.text.clone()),
        _ => serde_json::to_string(event),
    }
}

/// Encode one frame as bytes ready for the response body.
pub fn encode(frame: &Frame, framing: Framing) -> Result<Bytes, serde_json::Error> {
    match frame {
        Frame::KeepAlive => Ok(Bytes::from_static(KEEP_ALIVE)),
        Frame::Event(event) => {
            let payload = payload(event, framing)?;
            Ok(Bytes::from(format!("data: {payload}\n\n")))
        }
    }
}
