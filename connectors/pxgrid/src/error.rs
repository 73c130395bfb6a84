//! Control-plane error types.

use igm_backoff::BackoffError;
use igm_core::IgmError;
use igm_streaming::StreamError;
use thiserror::Error;

/// Control-plane and pub/sub errors.
#[derive(Error, Debug)]
pub enum PxgridError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control plane answered with a non-success status
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The account never reached the enabled state
    #[error("Account not enabled after {attempts} activation attempts")]
    AccountNotEnabled { attempts: u32 },

    /// Service lookup returned an empty list
    #[error("No service named {service}")]
    ServiceNotFound { service: String },

    /// A response lacked an expected field
    #[error("{endpoint} response missing {field}")]
    MissingField { endpoint: String, field: String },

    /// A service descriptor lacked an expected property
    #[error("Service {service} has no property {property}")]
    MissingProperty { service: String, property: String },

    /// A pub/sub message body was not JSON
    #[error("Malformed session message: {0}")]
    MalformedMessage(String),

    /// Pub/sub read attempted before connect
    #[error("Pub/sub channel not connected")]
    NotConnected,

    /// TLS, WebSocket or STOMP failure
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl PxgridError {
    /// Convert to the workspace error type.
    #[must_use]
    pub fn to_igm_error(&self) -> IgmError {
        match self {
            Self::Http(e) => IgmError::External {
                service: "pxgrid".into(),
                message: e.to_string(),
                status_code: e.status().map(|s| s.as_u16()),
            },
            Self::Api { status, .. } => IgmError::External {
                service: "pxgrid".into(),
                message: self.to_string(),
                status_code: Some(*status),
            },
            Self::AccountNotEnabled { attempts } => IgmError::AccountNotEnabled {
                attempts: *attempts,
            },
            Self::ServiceNotFound { service } => IgmError::ServiceNotFound {
                service: service.clone(),
            },
            Self::MissingField { .. } => IgmError::External {
                service: "pxgrid".into(),
                message: self.to_string(),
                status_code: None,
            },
            Self::MissingProperty { .. } => IgmError::configuration(self.to_string()),
            Self::MalformedMessage(message) => IgmError::MalformedEvent {
                message: message.clone(),
            },
            Self::NotConnected => IgmError::transport(self.to_string()),
            Self::Stream(e) => e.to_igm_error(),
        }
    }
}

impl From<BackoffError> for PxgridError {
    fn from(err: BackoffError) -> Self {
        match err {
            BackoffError::Exhausted { attempts } => Self::AccountNotEnabled { attempts },
        }
    }
}

impl From<PxgridError> for IgmError {
    fn from(err: PxgridError) -> Self {
        err.to_igm_error()
    }
}

/// Result type for control-plane operations.
pub type PxgridResult<T> = Result<T, PxgridError>;

#[cfg(test)]
mod tests {
    use super::*;
    use igm_core::ErrorClass;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            PxgridError::AccountNotEnabled { attempts: 10 }
                .to_igm_error()
                .class(),
            ErrorClass::Transient
        );
        assert_eq!(
            PxgridError::ServiceNotFound {
                service: "com.cisco.ise.session".into()
            }
            .to_igm_error()
            .class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            PxgridError::MalformedMessage("eof".into())
                .to_igm_error()
                .class(),
            ErrorClass::MalformedEvent
        );
        assert_eq!(
            PxgridError::Stream(StreamError::Broker {
                message: "denied".into()
            })
            .to_igm_error()
            .class(),
            ErrorClass::TransportFatal
        );
        assert!(PxgridError::NotConnected.to_igm_error().class().ends_epoch());
    }

    #[test]
    fn test_api_error_keeps_status() {
        let err = PxgridError::Api {
            endpoint: "ServiceLookup".into(),
            status: 401,
            body: "Unauthorized".into(),
        };
        match err.to_igm_error() {
            IgmError::External { status_code, .. } => assert_eq!(status_code, Some(401)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
