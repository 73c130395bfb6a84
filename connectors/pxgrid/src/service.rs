//! Service descriptors, access secrets and the session service.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{ControlPlaneClient, PxgridError, PxgridResult};

/// Name of the session directory service.
pub const SESSION_SERVICE: &str = "com.cisco.ise.session";

/// Result of a service lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "nodeName")]
    pub node_name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ServiceDescriptor {
    /// String property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// String property, or [`PxgridError::MissingProperty`].
    ///
    /// # Errors
    /// Fails when the property is absent or not a string.
    pub fn require_property(&self, key: &str) -> PxgridResult<&str> {
        self.property(key)
            .ok_or_else(|| PxgridError::MissingProperty {
                service: self.name.clone(),
                property: key.to_string(),
            })
    }
}

/// Credential for one (this node, peer node) pair. Never persisted; zeroed
/// on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessSecret {
    #[zeroize(skip)]
    peer_node: String,
    secret: String,
}

impl AccessSecret {
    #[must_use]
    pub fn new(peer_node: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            peer_node: peer_node.into(),
            secret: secret.into(),
        }
    }

    /// Peer the secret is bound to.
    #[must_use]
    pub fn peer_node(&self) -> &str {
        &self.peer_node
    }

    /// The secret itself.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AccessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSecret")
            .field("peer_node", &self.peer_node)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Group membership entry returned by the session service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// The session directory service.
#[derive(Debug, Clone)]
pub struct SessionService {
    client: Arc<ControlPlaneClient>,
    descriptor: ServiceDescriptor,
}

impl SessionService {
    const REST_BASE_URL: &'static str = "restBaseUrl";
    const PUBSUB_SERVICE: &'static str = "wsPubsubService";
    const SESSION_TOPIC: &'static str = "sessionTopic";

    /// Look up the session service and check it advertises what the bridge
    /// needs.
    ///
    /// # Errors
    /// Fails when the lookup fails or a required property is missing.
    pub async fn discover(client: Arc<ControlPlaneClient>) -> PxgridResult<Self> {
        let descriptor = client.lookup_service(SESSION_SERVICE).await?;
        let service = Self { client, descriptor };
        service.rest_base_url()?;
        service.pubsub_service_name()?;
        service.session_topic()?;
        debug!(node = %service.descriptor.node_name, "Session service discovered");
        Ok(service)
    }

    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn client(&self) -> &Arc<ControlPlaneClient> {
        &self.client
    }

    /// REST base of the session service.
    ///
    /// # Errors
    /// Fails when `restBaseUrl` is missing.
    pub fn rest_base_url(&self) -> PxgridResult<&str> {
        self.descriptor
            .require_property(Self::REST_BASE_URL)
            .map(|url| url.trim_end_matches('/'))
    }

    /// Name of the pub/sub service carrying the session topic.
    ///
    /// # Errors
    /// Fails when `wsPubsubService` is missing.
    pub fn pubsub_service_name(&self) -> PxgridResult<&str> {
        self.descriptor.require_property(Self::PUBSUB_SERVICE)
    }

    /// Session topic.
    ///
    /// # Errors
    /// Fails when `sessionTopic` is missing.
    pub fn session_topic(&self) -> PxgridResult<&str> {
        self.descriptor.require_property(Self::SESSION_TOPIC)
    }

    /// Groups of a user, empty when the response has none.
    ///
    /// # Errors
    /// Fails on transport or API errors, or a malformed `groups` list.
    #[instrument(skip(self))]
    pub async fn user_groups(&self, user_name: &str) -> PxgridResult<Vec<UserGroup>> {
        let url = format!("{}/getUserGroupByUserName", self.rest_base_url()?);
        let response = self
            .client
            .request_url(&url, &json!({ "userName": user_name }), true)
            .await?;
        match response.get("groups") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(groups) => serde_json::from_value(groups.clone()).map_err(|e| {
                PxgridError::MissingField {
                    endpoint: "getUserGroupByUserName".into(),
                    field: format!("groups ({e})"),
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_deserialize() {
        let descriptor: ServiceDescriptor = serde_json::from_value(json!({
            "name": "com.cisco.ise.session",
            "nodeName": "ise-mnt",
            "properties": {
                "restBaseUrl": "https://ise:8910/pxgrid/mnt/sd",
                "sessionTopic": "/topic/com.cisco.ise.session"
            }
        }))
        .unwrap();
        assert_eq!(descriptor.node_name, "ise-mnt");
        assert_eq!(
            descriptor.property("sessionTopic"),
            Some("/topic/com.cisco.ise.session")
        );
        assert!(matches!(
            descriptor.require_property("wsPubsubService"),
            Err(PxgridError::MissingProperty { .. })
        ));
    }

    #[test]
    fn test_access_secret_debug_is_redacted() {
        let secret = AccessSecret::new("ise-pubsub", "s3cr3t");
        assert_eq!(secret.expose(), "s3cr3t");
        let debug = format!("{secret:?}");
        assert!(debug.contains("ise-pubsub"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_user_group_deserialize() {
        let groups: Vec<UserGroup> = serde_json::from_value(json!([
            {"name": "Employees", "type": "IDENTITY"},
            {"name": "Contractors"}
        ]))
        .unwrap();
        assert_eq!(groups[0].kind.as_deref(), Some("IDENTITY"));
        assert_eq!(groups[1].kind, None);
    }
}
