//! Routing and transport errors.
//!
//! Only [`RoutingError`] ever reaches callers of the core. Transport errors
//! are absorbed by the CCP state machines, which roll back and retry.

use std::time::Duration;

use ilp_core::ccp::CodecError;

/// Failure of a single CCP exchange with a neighbour.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer did not answer within {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Failure(String),

    #[error("peer rejected request: {0}")]
    Rejected(String),
}

impl From<CodecError> for TransportError {
    fn from(e: CodecError) -> Self {
        TransportError::Failure(e.to_string())
    }
}

/// Request-level failures surfaced to whoever asked us to route something.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no route found for {prefix}")]
    NoRoute { prefix: String },

    #[error("no request handler registered for peer {peer}")]
    NoHandler { peer: String },

    #[error("unknown peer {peer}")]
    UnknownPeer { peer: String },

    #[error("request handler for {peer} failed: {message}")]
    HandlerFailed { peer: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_subject() {
        let err = RoutingError::NoRoute {
            prefix: "g.sally".to_string(),
        };
        assert_eq!(err.to_string(), "no route found for g.sally");

        let err = TransportError::Timeout(Duration::from_millis(150));
        assert!(err.to_string().contains("150ms"));
    }

    #[test]
    fn codec_errors_become_failures() {
        let codec = ilp_core::CcpRequest::from_bytes(b"nope").unwrap_err();
        assert!(matches!(TransportError::from(codec), TransportError::Failure(_)));
    }
}
