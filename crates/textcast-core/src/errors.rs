//! Delivery error types.

use thiserror::Error;

/// Failure to hand an event to one subscriber.
///
/// Isolated to that subscriber: the bus logs it and keeps delivering.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The consumer side of the subscriber has gone away.
    #[error("subscriber closed")]
    Closed,
}

impl DeliveryError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display() {
        assert_eq!(DeliveryError::Closed.to_string(), "subscriber closed");
        assert_eq!(DeliveryError::Closed.error_kind(), "closed");
    }
}
