//! Control-plane connection settings.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use igm_streaming::TlsSettings;
use serde::{Deserialize, Serialize};

/// Control-plane REST port.
pub const DEFAULT_CONTROL_PORT: u16 = 8910;

/// Connection descriptor, loaded once at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Control-plane host name.
    pub host: String,

    /// REST port (default: 8910)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Node name this client registers as.
    pub nodename: String,

    /// Password for basic auth when no client certificate is configured.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Free-text description sent with account activation.
    #[serde(default)]
    pub description: Option<String>,

    /// Client certificate (PEM).
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM).
    #[serde(default)]
    pub client_key: Option<PathBuf>,

    /// CA bundle for server verification (PEM).
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub ca_verify: bool,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

const fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl ControlPlaneConfig {
    /// Settings for `host` and `nodename`; everything else defaulted.
    #[must_use]
    pub fn new(host: impl Into<String>, nodename: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_CONTROL_PORT,
            nodename: nodename.into(),
            password: None,
            description: None,
            client_cert: None,
            client_key: None,
            ca_cert: None,
            ca_verify: true,
            timeout: default_timeout(),
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_client_identity(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_ca_verify(mut self, verify: bool) -> Self {
        self.ca_verify = verify;
        self
    }

    /// Control-plane base URL, with trailing slash.
    #[must_use]
    pub fn control_url(&self) -> String {
        format!("https://{}:{}/pxgrid/control/", self.host, self.port)
    }

    /// Basic-auth credentials. With a client certificate the password is
    /// empty; the certificate authenticates.
    #[must_use]
    pub fn basic_auth(&self) -> (&str, &str) {
        if self.client_cert.is_some() {
            (&self.nodename, "")
        } else {
            (&self.nodename, self.password.as_deref().unwrap_or(""))
        }
    }

    /// TLS settings shared by the REST and WebSocket clients.
    #[must_use]
    pub fn tls_settings(&self) -> TlsSettings {
        TlsSettings {
            ca_cert: self.ca_cert.clone(),
            client_cert: self.client_cert.clone(),
            client_key: self.client_key.clone(),
            verify: self.ca_verify,
        }
    }
}

impl fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("nodename", &self.nodename)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("description", &self.description)
            .field("client_cert", &self.client_cert)
            .field("client_key", &self.client_key)
            .field("ca_cert", &self.ca_cert)
            .field("ca_verify", &self.ca_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_url() {
        let config = ControlPlaneConfig::new("ise.example.com", "meraki-bridge");
        assert_eq!(
            config.control_url(),
            "https://ise.example.com:8910/pxgrid/control/"
        );
    }

    #[test]
    fn test_basic_auth_selection() {
        let password = ControlPlaneConfig::new("ise", "node").with_password("pw");
        assert_eq!(password.basic_auth(), ("node", "pw"));

        let cert = password.with_client_identity("node.pem", "node.key");
        assert_eq!(cert.basic_auth(), ("node", ""));
        assert!(cert.tls_settings().has_client_identity());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ControlPlaneConfig::new("ise", "node").with_password("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: ControlPlaneConfig =
            serde_json::from_str(r#"{"host": "ise", "nodename": "node"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_CONTROL_PORT);
        assert!(config.ca_verify);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
