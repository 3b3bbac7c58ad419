//! Bus-level error taxonomy
//!
//! Errors local to one message or one callback never abort the dispatch
//! loop or the connection; only transport-level failures change global
//! connection state. No error in this layer is fatal to the process.

use thiserror::Error;

/// Main error type for bus operations
#[derive(Debug, Error)]
pub enum BusError {
    /// Malformed payload for the bound serializer; the message is dropped.
    #[error("decode failed: {0}")]
    Decode(#[from] crate::serializer::DecodeError),

    /// Value could not be encoded with the bound serializer.
    #[error("encode failed: {0}")]
    Encode(#[from] crate::serializer::EncodeError),

    /// Publish attempted while the connection cannot accept it.
    #[error("transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// Underlying I/O failure; drives the manager into Disconnected.
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A subscriber callback failed; caught at the router boundary.
    #[error("callback failed: {message}")]
    Callback { message: String },

    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] crate::topic::TopicError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BusError {
    pub fn transport_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::TransportUnavailable {
            reason: reason.into(),
        }
    }

    pub fn transport<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Transport(Box::new(err))
    }

    pub fn callback<S: Into<String>>(message: S) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Status value returned by every publish.
///
/// Callers opt into ignoring this; the bus itself never suppresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the live connection while Connected.
    Delivered,
    /// Accepted while offline at QoS >= 1; the transport delivers it on
    /// reconnect.
    Queued,
    /// QoS 0 publish while Disconnected; no transport call was made.
    Dropped,
}

impl PublishOutcome {
    /// True unless the message was dropped under the offline QoS 0 policy.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, PublishOutcome::Dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BusError::transport_unavailable("not connected");
        assert_eq!(err.to_string(), "transport unavailable: not connected");

        let err = BusError::callback("subscriber returned error");
        assert_eq!(
            err.to_string(),
            "callback failed: subscriber returned error"
        );
    }

    #[test]
    fn test_publish_outcome_accepted() {
        assert!(PublishOutcome::Delivered.is_accepted());
        assert!(PublishOutcome::Queued.is_accepted());
        assert!(!PublishOutcome::Dropped.is_accepted());
    }
}
