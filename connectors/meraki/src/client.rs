//! Network-controller API client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use igm_core::{IgmResult, MappedAction, Provisioner};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::types::{ApiErrors, ProvisionRequest};
use crate::{MerakiError, MerakiResult};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.meraki.com/api/v1";

/// Provisioning client for the network controller.
pub struct MerakiClient {
    client: Client,
    api_key: Zeroizing<String>,
    base_url: String,
}

impl fmt::Debug for MerakiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerakiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl MerakiClient {
    /// Create a client with the default base URL.
    ///
    /// # Errors
    /// Fails when the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> MerakiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("igm-meraki/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: Zeroizing::new(api_key.into()),
            base_url: DEFAULT_BASE_URL.into(),
        })
    }

    /// Set the base URL (for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Provision `mac` as `name` on `network`.
    ///
    /// With a group the client gets that group policy; without one it is
    /// returned to the `Normal` policy.
    ///
    /// # Errors
    /// [`MerakiError::UnresolvedNetwork`] when `network` is `None` (no
    /// request is made), [`MerakiError::Api`] for a non-success status, and
    /// [`MerakiError::Http`] for transport failures.
    #[instrument(skip(self))]
    pub async fn provision_client(
        &self,
        network: Option<&str>,
        mac: &str,
        name: &str,
        group: Option<&str>,
    ) -> MerakiResult<Value> {
        let Some(network_id) = network else {
            return Err(MerakiError::UnresolvedNetwork {
                mac: mac.to_string(),
                name: name.to_string(),
            });
        };

        let url = format!("{}/networks/{network_id}/clients/provision", self.base_url);
        let body = ProvisionRequest::single(mac, name, group);
        debug!(%url, policy = ?body.device_policy, "Provisioning client");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let parsed = serde_json::from_slice::<ApiErrors>(&bytes).unwrap_or_default();
            let errors = if parsed.errors.is_empty() {
                vec![String::from_utf8_lossy(&bytes).into_owned()]
            } else {
                parsed.errors
            };
            return Err(MerakiError::Api {
                status: status.as_u16(),
                errors,
                network_id: network_id.to_string(),
                mac: mac.to_string(),
                name: name.to_string(),
            });
        }

        info!(network_id, mac, name, group, "Client provisioned");
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Provisioner for MerakiClient {
    async fn provision(&self, action: &MappedAction) -> IgmResult<()> {
        let network = action.network.as_deref();
        self.provision_client(network, &action.mac, &action.name, action.group.as_deref())
            .await
            .map(|_| ())
            .map_err(|e| e.to_igm_error(network, &action.mac, &action.name))
    }
}

#[cfg(test)]
mod tests {
    use igm_core::{ErrorClass, IgmError};
    use igm_testkit::{MockApiServer, provision_path};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;

    fn action(network: Option<&str>, group: Option<&str>) -> MappedAction {
        MappedAction {
            network: network.map(str::to_string),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            name: "alice".into(),
            group: group.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_provision_sends_group_policy() {
        let server = MockApiServer::start().await;
        Mock::given(method("POST"))
            .and(path(provision_path("N_1")))
            .and(header("authorization", "Bearer k3y"))
            .and(body_json(json!({
                "clients": [{"mac": "AA:BB:CC:DD:EE:FF", "name": "alice"}],
                "devicePolicy": "Group policy",
                "groupPolicyId": "101"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"clients": []})))
            .expect(1)
            .mount(server.inner())
            .await;

        let client = MerakiClient::new("k3y").unwrap().with_base_url(server.base_url());
        client.provision(&action(Some("N_1"), Some("101"))).await.unwrap();
    }

    #[tokio::test]
    async fn test_provision_without_group_is_normal() {
        let server = MockApiServer::start().await;
        server.expect_provision("N_1").await;

        let client = MerakiClient::new("k3y").unwrap().with_base_url(server.base_url());
        client.provision(&action(Some("N_1"), None)).await.unwrap();

        let sent = server.requests_to("/clients/provision").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body["devicePolicy"], "Normal");
        assert!(sent[0].body.get("groupPolicyId").is_none());
    }

    #[tokio::test]
    async fn test_unresolved_network_makes_no_request() {
        let server = MockApiServer::start().await;
        let client = MerakiClient::new("k3y").unwrap().with_base_url(server.base_url());

        let err = client.provision(&action(None, Some("101"))).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Provisioning);
        assert!(matches!(err, IgmError::Provisioning { network: None, .. }));
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_api_errors_are_carried() {
        let server = MockApiServer::start().await;
        server
            .expect_provision_error("N_1", 400, &["Group policy 999 not found"])
            .await;
        let client = MerakiClient::new("k3y").unwrap().with_base_url(server.base_url());

        let err = client
            .provision_client(Some("N_1"), "AA:BB:CC:DD:EE:FF", "alice", Some("999"))
            .await
            .unwrap_err();
        match err {
            MerakiError::Api {
                status,
                errors,
                network_id,
                ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(errors, vec!["Group policy 999 not found".to_string()]);
                assert_eq!(network_id, "N_1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_kept() {
        let server = MockApiServer::start().await;
        Mock::given(method("POST"))
            .and(path(provision_path("N_1")))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(server.inner())
            .await;
        let client = MerakiClient::new("k3y").unwrap().with_base_url(server.base_url());

        let err = client.provision(&action(Some("N_1"), None)).await.unwrap_err();
        match err {
            IgmError::Provisioning {
                message,
                status_code,
                mac,
                ..
            } => {
                assert_eq!(status_code, Some(502));
                assert!(message.contains("bad gateway"));
                assert_eq!(mac, "AA:BB:CC:DD:EE:FF");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = MerakiClient::new("super-secret").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }
}
