//! Failures of the pub/sub transport.
//!
//! All of these end the connection they occurred on. [`StreamError::Tls`] is
//! the exception in how it is reported: bad certificate material is a
//! configuration problem, not a network one.

use std::time::Duration;

use igm_core::IgmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Could not open {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("No answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    InvalidState(String),

    #[error("WebSocket: {0}")]
    Socket(String),

    #[error("TLS material: {0}")]
    Tls(String),

    #[error("Malformed STOMP frame: {0}")]
    Frame(String),

    #[error("Expected {expected} frame, broker sent {actual}")]
    UnexpectedFrame { expected: String, actual: String },

    /// The broker's ERROR frame, carrying its `message` header or body.
    #[error("Broker error: {message}")]
    Broker { message: String },
}

impl StreamError {
    #[must_use]
    pub fn to_igm_error(&self) -> IgmError {
        match self {
            Self::Broker { message } => IgmError::BrokerError {
                message: message.clone(),
            },
            Self::Tls(message) => IgmError::configuration(format!("TLS: {message}")),
            other => IgmError::transport(other.to_string()),
        }
    }
}

impl From<StreamError> for IgmError {
    fn from(err: StreamError) -> Self {
        err.to_igm_error()
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use igm_core::ErrorClass;

    use super::*;

    #[test]
    fn test_tls_is_configuration() {
        let err = IgmError::from(StreamError::Tls("no certificate in ca.pem".into()));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_broker_error_keeps_message() {
        let err = IgmError::from(StreamError::Broker {
            message: "bad login".into(),
        });
        assert_eq!(
            err,
            IgmError::BrokerError {
                message: "bad login".into()
            }
        );
    }

    #[test]
    fn test_socket_failures_are_transport_fatal() {
        let err = IgmError::from(StreamError::Timeout(Duration::from_secs(10)));
        assert_eq!(err.class(), ErrorClass::TransportFatal);
        assert!(err.to_string().contains("10s"));
    }
}
