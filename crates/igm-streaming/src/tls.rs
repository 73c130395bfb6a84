//! TLS client contexts for the control plane and the pub/sub channel.
//!
//! Both the REST client and the WebSocket client are built from the same
//! [`TlsSettings`], so trust and client identity stay consistent across the
//! two connections.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::warn;

use crate::{StreamError, StreamResult};

/// TLS material and policy for outbound connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// CA bundle used to verify the server.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate chain (mutual TLS).
    pub client_cert: Option<PathBuf>,
    /// Client private key (mutual TLS).
    pub client_key: Option<PathBuf>,
    /// Verify the server certificate. Disabling this accepts any server.
    pub verify: bool,
}

impl TlsSettings {
    /// Verification on, no material.
    #[must_use]
    pub fn new() -> Self {
        Self {
            verify: true,
            ..Self::default()
        }
    }

    /// Set the CA bundle.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Set the client identity.
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

    /// Enable or disable server verification.
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Whether a client identity is configured.
    #[must_use]
    pub const fn has_client_identity(&self) -> bool {
        self.client_cert.is_some()
    }

    /// Build a rustls client configuration.
    ///
    /// # Errors
    /// Returns [`StreamError::Tls`] when a file cannot be read, holds no usable
    /// PEM material, verification is requested without a CA bundle, or a
    /// client certificate is configured without its key.
    pub fn client_config(&self) -> StreamResult<ClientConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| StreamError::Tls(e.to_string()))?;

        let builder = if self.verify {
            let ca_path = self.ca_cert.as_deref().ok_or_else(|| {
                StreamError::Tls("server verification enabled but no CA certificate set".into())
            })?;
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .map_err(|e| StreamError::Tls(format!("{}: {e}", ca_path.display())))?;
            }
            builder.with_root_certificates(roots)
        } else {
            warn!("TLS server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        };

        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                .map_err(|e| StreamError::Tls(format!("client identity: {e}"))),
            (Some(_), None) => Err(StreamError::Tls(
                "client certificate configured without a private key".into(),
            )),
            (None, _) => Ok(builder.with_no_client_auth()),
        }
    }
}

/// Load every certificate in a PEM file.
///
/// # Errors
/// Returns [`StreamError::Tls`] if the file is unreadable or holds no
/// certificates.
pub fn load_certs(path: &Path) -> StreamResult<Vec<CertificateDer<'static>>> {
    let file =
        File::open(path).map_err(|e| StreamError::Tls(format!("{}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StreamError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(StreamError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key in a PEM file.
///
/// # Errors
/// Returns [`StreamError::Tls`] if the file is unreadable or holds no key.
pub fn load_key(path: &Path) -> StreamResult<PrivateKeyDer<'static>> {
    let file =
        File::open(path).map_err(|e| StreamError::Tls(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| StreamError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| StreamError::Tls(format!("{}: no private key found", path.display())))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unverified_without_material_builds() {
        let config = TlsSettings::new().with_verify(false).client_config();
        assert!(config.is_ok());
    }

    #[test]
    fn test_verify_requires_ca() {
        let err = TlsSettings::new().client_config().unwrap_err();
        assert!(matches!(err, StreamError::Tls(ref m) if m.contains("no CA certificate")));
    }

    #[test]
    fn test_missing_ca_file() {
        let err = TlsSettings::new()
            .with_ca_cert("/nonexistent/ca.pem")
            .client_config()
            .unwrap_err();
        assert!(matches!(err, StreamError::Tls(ref m) if m.contains("/nonexistent/ca.pem")));
    }

    #[test]
    fn test_ca_file_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a pem bundle").unwrap();
        let err = TlsSettings::new()
            .with_ca_cert(file.path())
            .client_config()
            .unwrap_err();
        assert!(matches!(err, StreamError::Tls(ref m) if m.contains("no certificates found")));
    }

    #[test]
    fn test_client_cert_without_key() {
        let settings = TlsSettings {
            client_cert: Some("/tmp/client.pem".into()),
            verify: false,
            ..TlsSettings::default()
        };
        assert!(settings.has_client_identity());
        let err = settings.client_config().unwrap_err();
        assert!(matches!(err, StreamError::Tls(ref m) if m.contains("without a private key")));
    }
}
