//! Error taxonomy shared across the workspace.
//!
//! Crate-local errors convert into [`IgmError`] at the crate boundary; the
//! dispatch loop only ever looks at the [`ErrorClass`] to decide whether an
//! error ends the connection epoch or is logged and skipped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification used by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Control plane not ready yet; retried with bounded backoff.
    Transient,
    /// The pub/sub connection is gone; ends the current epoch.
    TransportFatal,
    /// An event (or one session in it) could not be interpreted.
    MalformedEvent,
    /// The network controller rejected or failed a provisioning call.
    Provisioning,
    /// Local configuration is unusable.
    Configuration,
}

impl ErrorClass {
    /// Whether an error of this class terminates the current connection epoch.
    #[must_use]
    pub const fn ends_epoch(self) -> bool {
        matches!(self, Self::TransportFatal | Self::Configuration)
    }
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category")]
pub enum IgmError {
    // ─────────────────────────────────────────────────────────────────────────
    // Control plane
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Control plane account not enabled after {attempts} attempts")]
    AccountNotEnabled { attempts: u32 },

    #[error("Service lookup returned no services for {service}")]
    ServiceNotFound { service: String },

    #[error("{service} error: {message}")]
    External {
        service: String,
        message: String,
        status_code: Option<u16>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Transport failed: {message}")]
    Transport { message: String },

    #[error("Broker sent ERROR frame: {message}")]
    BrokerError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Malformed event: {message}")]
    MalformedEvent { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Provisioning
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Provisioning {name} ({mac}) into network {network:?} failed: {message}")]
    Provisioning {
        message: String,
        network: Option<String>,
        mac: String,
        name: String,
        status_code: Option<u16>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Local
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache store error: {message}")]
    Cache { message: String },
}

impl IgmError {
    /// Reduce this error to its class.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::AccountNotEnabled { .. } | Self::External { .. } | Self::Cache { .. } => {
                ErrorClass::Transient
            }
            Self::Transport { .. } | Self::BrokerError { .. } => ErrorClass::TransportFatal,
            Self::MalformedEvent { .. } => ErrorClass::MalformedEvent,
            Self::Provisioning { .. } => ErrorClass::Provisioning,
            Self::ServiceNotFound { .. } | Self::Configuration { .. } => ErrorClass::Configuration,
        }
    }

    /// Shorthand for a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for cross-crate operations.
pub type IgmResult<T> = Result<T, IgmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_end_epoch() {
        assert!(IgmError::transport("reset by peer").class().ends_epoch());
        assert!(
            IgmError::BrokerError {
                message: "bad login".into()
            }
            .class()
            .ends_epoch()
        );
    }

    #[test]
    fn test_event_and_provisioning_errors_do_not_end_epoch() {
        let malformed = IgmError::MalformedEvent {
            message: "no ip".into(),
        };
        assert_eq!(malformed.class(), ErrorClass::MalformedEvent);
        assert!(!malformed.class().ends_epoch());

        let provisioning = IgmError::Provisioning {
            message: "404".into(),
            network: Some("N1".into()),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            name: "alice".into(),
            status_code: Some(404),
        };
        assert_eq!(provisioning.class(), ErrorClass::Provisioning);
        assert!(!provisioning.class().ends_epoch());
    }

    #[test]
    fn test_error_serializes_with_category_tag() {
        let err = IgmError::AccountNotEnabled { attempts: 10 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["category"], "AccountNotEnabled");
        assert_eq!(json["attempts"], 10);
    }
}
