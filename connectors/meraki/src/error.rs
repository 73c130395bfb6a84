//! Provisioning error types.

use igm_core::IgmError;
use thiserror::Error;

/// Result type for provisioning operations.
pub type MerakiResult<T> = Result<T, MerakiError>;

/// Provisioning errors.
#[derive(Debug, Error)]
pub enum MerakiError {
    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the request
    #[error("Provisioning {name} ({mac}) on {network_id} failed with HTTP {status}: {}", .errors.join("; "))]
    Api {
        status: u16,
        errors: Vec<String>,
        network_id: String,
        mac: String,
        name: String,
    },

    /// The client's address matched no known network
    #[error("No network resolved for {name} ({mac})")]
    UnresolvedNetwork { mac: String, name: String },
}

impl MerakiError {
    /// Convert to the workspace error type. Every variant is a
    /// provisioning failure; the HTTP case carries no client context, so
    /// `network`, `mac` and `name` are filled in by the caller.
    #[must_use]
    pub fn to_igm_error(&self, network: Option<&str>, mac: &str, name: &str) -> IgmError {
        let status_code = match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::UnresolvedNetwork { .. } => None,
        };
        IgmError::Provisioning {
            message: self.to_string(),
            network: network.map(str::to_string),
            mac: mac.to_string(),
            name: name.to_string(),
            status_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use igm_core::ErrorClass;

    use super::*;

    #[test]
    fn test_api_error_display_joins_errors() {
        let err = MerakiError::Api {
            status: 400,
            errors: vec!["Invalid MAC".into(), "Unknown policy".into()],
            network_id: "N_1".into(),
            mac: "AA:BB".into(),
            name: "alice".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provisioning alice (AA:BB) on N_1 failed with HTTP 400: Invalid MAC; Unknown policy"
        );
        let igm = err.to_igm_error(Some("N_1"), "AA:BB", "alice");
        assert_eq!(igm.class(), ErrorClass::Provisioning);
        assert!(matches!(igm, IgmError::Provisioning { status_code: Some(400), .. }));
    }

    #[test]
    fn test_unresolved_network_has_no_status() {
        let err = MerakiError::UnresolvedNetwork {
            mac: "AA:BB".into(),
            name: "alice".into(),
        };
        let igm = err.to_igm_error(None, "AA:BB", "alice");
        assert!(matches!(
            igm,
            IgmError::Provisioning {
                network: None,
                status_code: None,
                ..
            }
        ));
    }
}
